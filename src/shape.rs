//! Shape utilities: broadcasting, element counts and row-major layouts.

use crate::error::KeplerError;

/// Broadcasts two shapes under the usual array rules.
///
/// Trailing dimensions are aligned; a dimension of size 1 stretches to match
/// the other side; missing leading dimensions count as 1.
///
/// # Errors
///
/// [`KeplerError::ShapeError`] if some aligned pair differs and neither is 1.
///
/// # Example
///
/// ```
/// use kepler_op::shape::broadcast_shapes;
/// assert_eq!(broadcast_shapes(&[55, 101], &[55, 1]).unwrap(), vec![55, 101]);
/// assert_eq!(broadcast_shapes(&[3], &[]).unwrap(), vec![3]);
/// assert!(broadcast_shapes(&[2, 3], &[4]).is_err());
/// ```
pub fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>, KeplerError> {
    let ndim = lhs.len().max(rhs.len());
    let mut out = vec![0usize; ndim];

    for (i, dim) in out.iter_mut().enumerate() {
        let d1 = aligned_dim(lhs, ndim, i);
        let d2 = aligned_dim(rhs, ndim, i);

        *dim = if d1 == d2 || d2 == 1 {
            d1
        } else if d1 == 1 {
            d2
        } else {
            return Err(KeplerError::ShapeError {
                lhs: lhs.to_vec(),
                rhs: rhs.to_vec(),
            });
        };
    }

    Ok(out)
}

fn aligned_dim(shape: &[usize], ndim: usize, i: usize) -> usize {
    let offset = ndim - shape.len();
    if i < offset { 1 } else { shape[i - offset] }
}

/// Number of elements of `shape` as a 64-bit integer.
///
/// A rank-0 shape holds one element.
///
/// # Errors
///
/// [`KeplerError::SizeOverflow`] if the product does not fit an `i64`.
pub fn element_count(shape: &[usize]) -> Result<i64, KeplerError> {
    shape
        .iter()
        .try_fold(1i64, |acc, &d| {
            i64::try_from(d).ok().and_then(|d| acc.checked_mul(d))
        })
        .ok_or_else(|| KeplerError::SizeOverflow {
            shape: shape.to_vec(),
        })
}

/// Canonical row-major layout as a minor-to-major dimension order.
///
/// The innermost (last) dimension varies fastest, so the order is the
/// dimension indices reversed: `rank-1, ..., 1, 0`.
#[must_use]
pub fn row_major_layout(rank: usize) -> Vec<usize> {
    (0..rank).rev().collect()
}

/// Row-major (C-contiguous) strides, in elements.
#[must_use]
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}
