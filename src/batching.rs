//! Batching rule.
//!
//! The primitive is element-wise with full broadcasting, so a batched call is
//! just the public entry point applied to the batched arrays. The only work is
//! checking that both inputs share one batch axis and, when their per-example
//! ranks differ, lining up the per-example dimensions before broadcasting.

use crate::error::KeplerError;
use crate::primitive::kepler_primitive;
use crate::tensors::Array;

/// Batched outputs `(sin E, cos E)` and the axis they are batched along.
pub type BatchOutput = ((Array, Array), usize);

/// Applies the primitive to inputs carrying a batch dimension at `axes`.
///
/// # Errors
/// - [`KeplerError::InvalidArgument`] if the two axes differ, an axis is out of
///   range, or the batch sizes differ.
/// - Otherwise whatever [`kepler_solve`](crate::kepler_solve) reports.
pub fn batch_rule(args: (&Array, &Array), axes: (usize, usize)) -> Result<BatchOutput, KeplerError> {
    let (mean_anomaly, eccentricity) = args;
    let (axis, ecc_axis) = axes;
    if axis != ecc_axis {
        return Err(KeplerError::InvalidArgument(format!(
            "batch axes must match: mean anomaly is batched along axis {axis}, \
             eccentricity along axis {ecc_axis}"
        )));
    }
    for (name, arg) in [("mean anomaly", mean_anomaly), ("eccentricity", eccentricity)] {
        if axis >= arg.shape().len() {
            return Err(KeplerError::InvalidArgument(format!(
                "batch axis {axis} is out of range for {name} of shape {:?}",
                arg.shape()
            )));
        }
    }
    let (size, ecc_size) = (mean_anomaly.shape()[axis], eccentricity.shape()[axis]);
    if size != ecc_size {
        return Err(KeplerError::InvalidArgument(format!(
            "batch sizes differ along axis {axis}: {size} vs {ecc_size}"
        )));
    }

    let rank = mean_anomaly.shape().len().max(eccentricity.shape().len());
    let mean_anomaly = align_example_rank(mean_anomaly, axis, rank)?;
    let eccentricity = align_example_rank(eccentricity, axis, rank)?;

    Ok((crate::kepler_solve(&mean_anomaly, &eccentricity)?, axis))
}

/// Inserts unit dimensions right after the batch axis until `array` has `rank`
/// dimensions, so per-example dimensions are right-aligned for broadcasting.
fn align_example_rank(array: &Array, axis: usize, rank: usize) -> Result<Array, KeplerError> {
    let current = array.shape().len();
    if current == rank {
        return Ok(array.clone());
    }

    let leading = array.moveaxis(axis, 0)?;
    let mut shape = leading.shape().to_vec();
    shape.splice(1..1, core::iter::repeat_n(1, rank - current));
    leading.reshape(shape)?.moveaxis(0, axis)
}

/// Maps the primitive over a batch axis of each input, like a vectorizing map.
///
/// The outputs carry the batch dimension first, so that
/// `batch_apply(m, e, (a, a))` equals stacking `kepler_solve(m_i, e_i)` along
/// axis 0 for each index `i` along `a`.
///
/// # Errors
/// As [`batch_rule`].
pub fn batch_apply(
    mean_anomaly: &Array,
    eccentricity: &Array,
    in_axes: (usize, usize),
) -> Result<(Array, Array), KeplerError> {
    let ((sin_e, cos_e), axis) = (kepler_primitive().batch)((mean_anomaly, eccentricity), in_axes)?;
    Ok((sin_e.moveaxis(axis, 0)?, cos_e.moveaxis(axis, 0)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensors::Tensor;

    #[test]
    fn differing_axes_are_invalid() {
        let a = Array::from(Tensor::new(vec![2, 2], vec![0.1f64; 4]));
        assert!(matches!(
            batch_rule((&a, &a), (0, 1)),
            Err(KeplerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn out_of_range_axis_is_invalid() {
        let a = Array::from(Tensor::new(vec![2], vec![0.1f64; 2]));
        assert!(batch_rule((&a, &a), (1, 1)).is_err());
    }

    #[test]
    fn lower_rank_example_is_right_aligned() {
        // per-example M is [3], per-example e is a scalar
        let m = Array::from(Tensor::new(vec![2, 3], vec![0.1f64, 0.2, 0.3, 0.4, 0.5, 0.6]));
        let e = Array::from(Tensor::new(vec![2], vec![0.0f64, 0.5]));
        let ((s, _), axis) = batch_rule((&m, &e), (0, 0)).unwrap();
        assert_eq!(axis, 0);
        assert_eq!(s.shape(), &[2, 3]);
        let s = s.as_f64().unwrap();
        // e = 0 on the first row leaves E = M
        assert!((s.data[2] - 0.3f64.sin()).abs() < 1e-15);
    }

    #[test]
    fn aligned_shape_keeps_batch_axis_in_place() {
        let e = Array::from(Tensor::new(vec![3, 4], vec![0.1f32; 12]));
        let aligned = align_example_rank(&e, 1, 4).unwrap();
        // per-example [3] becomes [1, 1, 3], batch stays at axis 1
        assert_eq!(aligned.shape(), &[1, 4, 1, 3]);
    }
}
