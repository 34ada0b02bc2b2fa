//! Input normalization for the public entry point.
//!
//! Turns two arbitrary broadcast-compatible inputs into the exact form the
//! primitive requires: canonical dtypes, one common shape, and a mean anomaly
//! wrapped into `[0, 2π)`.

use crate::config;
use crate::dtype::Float;
use crate::error::KeplerError;
use crate::shape::broadcast_shapes;
use crate::tensors::{Array, Tensor};

/// Broadcasts both arrays to their common shape, keeping each dtype.
///
/// # Errors
/// [`KeplerError::ShapeError`] if the shapes are not broadcast-compatible.
pub fn broadcast_arrays(lhs: &Array, rhs: &Array) -> Result<(Array, Array), KeplerError> {
    let shape = broadcast_shapes(lhs.shape(), rhs.shape())?;
    Ok((lhs.broadcast_to(&shape)?, rhs.broadcast_to(&shape)?))
}

/// Reduces every element modulo `2π` into `[0, 2π)`.
///
/// Uses a floored (Euclidean) remainder, so negative angles land in range
/// instead of keeping their sign as truncating remainder would.
#[must_use]
pub fn wrap_angle<T: Float>(angles: &Tensor<T>) -> Tensor<T> {
    angles.map(|m| {
        let r = m.rem_euclid(T::TWO_PI);
        // tiny negative inputs can round up to exactly 2π
        if r >= T::TWO_PI { T::ZERO } else { r }
    })
}

/// [`wrap_angle`] on a dtype-erased array.
#[must_use]
pub fn wrap_mean_anomaly(mean_anomaly: &Array) -> Array {
    match mean_anomaly {
        Array::F32(t) => Array::F32(wrap_angle(t)),
        Array::F64(t) => Array::F64(wrap_angle(t)),
    }
}

/// Full normalization under the process-wide x64 switch.
///
/// Returns `(mean_anomaly, eccentricity)` with a common shape and the mean
/// anomaly wrapped. Dtypes are canonicalized but not unified; a float32/float64
/// mix is left for the abstract evaluator to reject.
///
/// # Errors
/// [`KeplerError::ShapeError`] if the shapes are not broadcast-compatible.
pub fn normalize_inputs(
    mean_anomaly: &Array,
    eccentricity: &Array,
) -> Result<(Array, Array), KeplerError> {
    let x64 = config::enable_x64();
    let mean_anomaly = mean_anomaly.clone().canonicalize(x64);
    let eccentricity = eccentricity.clone().canonicalize(x64);

    let (mean_anomaly, eccentricity) = broadcast_arrays(&mean_anomaly, &eccentricity)?;
    Ok((wrap_mean_anomaly(&mean_anomaly), eccentricity))
}

#[cfg(test)]
mod tests {
    use core::f64::consts::{PI, TAU};

    use super::*;

    #[test]
    fn wraps_negative_and_large_angles() {
        let m = Tensor::new(vec![5], vec![-PI, -1e-20, 0.0, TAU, 3.0 * TAU + 1.0]);
        let w = wrap_angle(&m);
        assert!((w.data[0] - PI).abs() < 1e-12);
        assert_eq!(w.data[1], 0.0);
        assert_eq!(w.data[2], 0.0);
        assert!(w.data[3].abs() < 1e-12);
        assert!((w.data[4] - 1.0).abs() < 1e-12);
        assert!(w.data.iter().all(|&x| (0.0..TAU).contains(&x)));
    }

    #[test]
    fn broadcasts_column_against_grid() {
        let m = Array::from(Tensor::new(vec![2, 3], vec![0.0f64; 6]));
        let e = Array::from(Tensor::new(vec![2, 1], vec![0.1f64, 0.2]));
        let (m, e) = normalize_inputs(&m, &e).unwrap();
        assert_eq!(m.shape(), &[2, 3]);
        assert_eq!(e.as_f64().unwrap().data, vec![0.1, 0.1, 0.1, 0.2, 0.2, 0.2]);
    }

    #[test]
    fn incompatible_shapes_fail() {
        let m = Array::from(Tensor::new(vec![2, 3], vec![0.0f32; 6]));
        let e = Array::from(Tensor::new(vec![2], vec![0.1f32, 0.2]));
        assert!(matches!(
            normalize_inputs(&m, &e),
            Err(KeplerError::ShapeError { .. })
        ));
    }
}
