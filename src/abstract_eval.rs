//! Shape and dtype rule of the primitive.
//!
//! This is the graph-level type contract: it runs before any backend call is
//! built, and everything downstream (lowering, execution, the derivative and
//! batching rules) relies on the two operands agreeing exactly.

use core::fmt;

use crate::config;
use crate::dtype::DType;
use crate::error::KeplerError;

/// Shape/dtype descriptor of an array, without data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapedArray {
    /// Dimension sizes, outermost first.
    pub shape: Vec<usize>,
    /// Element type.
    pub dtype: DType,
}

impl ShapedArray {
    /// Creates a descriptor.
    pub fn new(shape: impl Into<Vec<usize>>, dtype: DType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
        }
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

impl fmt::Display for ShapedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.dtype.tag(), self.shape)
    }
}

/// Derives the output descriptors of the primitive from its input descriptors.
///
/// Uses the process-wide x64 switch for canonicalization; see
/// [`abstract_eval_with`].
///
/// # Errors
///
/// See [`abstract_eval_with`].
pub fn abstract_eval(
    mean_anomaly: &ShapedArray,
    eccentricity: &ShapedArray,
) -> Result<(ShapedArray, ShapedArray), KeplerError> {
    abstract_eval_with(mean_anomaly, eccentricity, config::enable_x64())
}

/// Derives the output descriptors under an explicit x64 switch.
///
/// Both outputs (`sin E`, `cos E`) share the common input shape and the
/// canonical input dtype.
///
/// # Errors
///
/// - [`KeplerError::TypeMismatch`] if the canonical dtypes differ.
/// - [`KeplerError::ShapeMismatch`] if the shapes differ.
pub fn abstract_eval_with(
    mean_anomaly: &ShapedArray,
    eccentricity: &ShapedArray,
    enable_x64: bool,
) -> Result<(ShapedArray, ShapedArray), KeplerError> {
    let dtype = mean_anomaly.dtype.canonicalize(enable_x64);
    let ecc_dtype = eccentricity.dtype.canonicalize(enable_x64);
    if dtype != ecc_dtype {
        return Err(KeplerError::TypeMismatch {
            mean_anomaly: dtype,
            eccentricity: ecc_dtype,
        });
    }
    if mean_anomaly.shape != eccentricity.shape {
        return Err(KeplerError::ShapeMismatch {
            mean_anomaly: mean_anomaly.shape.clone(),
            eccentricity: eccentricity.shape.clone(),
        });
    }

    let out = ShapedArray::new(mean_anomaly.shape.clone(), dtype);
    Ok((out.clone(), out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_mirror_inputs() {
        let a = ShapedArray::new(vec![55, 101], DType::F64);
        let (s, c) = abstract_eval_with(&a, &a, true).unwrap();
        assert_eq!(s, a);
        assert_eq!(c, a);
    }

    #[test]
    fn dtypes_compare_after_canonicalization() {
        let m = ShapedArray::new(vec![3], DType::F64);
        let e = ShapedArray::new(vec![3], DType::F32);
        assert_eq!(
            abstract_eval_with(&m, &e, true),
            Err(KeplerError::TypeMismatch {
                mean_anomaly: DType::F64,
                eccentricity: DType::F32
            })
        );
        let (s, _) = abstract_eval_with(&m, &e, false).unwrap();
        assert_eq!(s.dtype, DType::F32);
    }

    #[test]
    fn shapes_must_match_exactly() {
        let m = ShapedArray::new(vec![55, 101], DType::F32);
        let e = ShapedArray::new(vec![55, 1], DType::F32);
        assert!(matches!(
            abstract_eval_with(&m, &e, true),
            Err(KeplerError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(ShapedArray::new(vec![2, 3], DType::F32).to_string(), "f32[2, 3]");
    }
}
