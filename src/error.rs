//! Error type shared by every stage of the Kepler primitive.
//!
//! Each variant carries enough context (dtype, shape, platform, symbol) to
//! diagnose a failing call without re-running it. None of these conditions
//! are retried or recovered from internally; they surface to the caller as-is.

use thiserror::Error;

use crate::backend::Platform;
use crate::dtype::DType;

/// Failure raised while normalizing, validating, lowering, differentiating,
/// batching or executing the Kepler primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeplerError {
    /// The two inputs cannot be broadcast to a common shape.
    #[error("shapes {lhs:?} and {rhs:?} are not broadcast-compatible")]
    ShapeError {
        /// Shape of the mean-anomaly input.
        lhs: Vec<usize>,
        /// Shape of the eccentricity input.
        rhs: Vec<usize>,
    },

    /// The canonical dtypes of the two operands disagree.
    #[error("dtype mismatch: mean anomaly is {mean_anomaly}, eccentricity is {eccentricity}")]
    TypeMismatch {
        /// Canonical dtype of the mean-anomaly operand.
        mean_anomaly: DType,
        /// Canonical dtype of the eccentricity operand.
        eccentricity: DType,
    },

    /// An array holds a different dtype than the operation it was handed to.
    #[error("expected a {expected} array, found {found}")]
    UnexpectedDType {
        /// Dtype required at this point.
        expected: DType,
        /// Dtype actually supplied.
        found: DType,
    },

    /// The shapes of the two operands disagree.
    #[error("shape mismatch: mean anomaly is {mean_anomaly:?}, eccentricity is {eccentricity:?}")]
    ShapeMismatch {
        /// Shape of the mean-anomaly operand.
        mean_anomaly: Vec<usize>,
        /// Shape of the eccentricity operand.
        eccentricity: Vec<usize>,
    },

    /// No native kernel exists for this dtype.
    #[error("unsupported dtype {dtype} for {platform} dispatch (expected float32 or float64)")]
    NotImplemented {
        /// Offending dtype.
        dtype: DType,
        /// Platform the call was being lowered for.
        platform: Platform,
    },

    /// The requested backend is not available in this process.
    #[error("{platform} backend unavailable: {reason}")]
    Unavailable {
        /// Requested platform.
        platform: Platform,
        /// Why it cannot be used.
        reason: String,
    },

    /// An argument is outside the accepted set (unknown backend tag, mismatched
    /// batch axes, out-of-range axis, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The element count of a shape does not fit a signed 64-bit integer.
    #[error("element count of shape {shape:?} overflows a 64-bit integer")]
    SizeOverflow {
        /// Shape whose product overflowed.
        shape: Vec<usize>,
    },

    /// A native symbol was registered twice with different targets.
    #[error("native target `{symbol}` is already registered for {platform} with a different function")]
    ConflictingRegistration {
        /// Symbol name.
        symbol: String,
        /// Platform of the existing registration.
        platform: Platform,
    },

    /// A native kernel rejected its buffers or failed while running.
    #[error("kernel `{symbol}` failed: {reason}")]
    Kernel {
        /// Symbol of the failing kernel.
        symbol: String,
        /// Failure description.
        reason: String,
    },

    /// The opaque backend payload could not be decoded.
    #[error("invalid opaque descriptor: {0}")]
    Descriptor(String),
}

impl KeplerError {
    pub(crate) fn kernel(symbol: &str, reason: impl Into<String>) -> Self {
        Self::Kernel {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}
