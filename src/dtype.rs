//! Element types.
//!
//! [`DType`] is the tag carried by shape/dtype descriptors and is wider than
//! the set of types a [`Tensor`](crate::tensors::Tensor) can hold: the
//! dispatcher has to be able to see, and reject, descriptors for dtypes the
//! native kernels do not implement.

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};

use crate::error::KeplerError;
use crate::ops::Buffer;
use crate::tensors::{Array, Tensor};

/// Element type tag of an array descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// IEEE half precision.
    F16,
    /// bfloat16.
    BF16,
    /// IEEE single precision.
    F32,
    /// IEEE double precision.
    F64,
    /// 32-bit signed integer.
    S32,
    /// 64-bit signed integer.
    S64,
}

impl DType {
    /// Maps a dtype to the one used when the x64 switch is off.
    ///
    /// With `enable_x64` set every dtype is already canonical.
    #[must_use]
    pub const fn canonicalize(self, enable_x64: bool) -> Self {
        match (self, enable_x64) {
            (Self::F64, false) => Self::F32,
            (Self::S64, false) => Self::S32,
            (dtype, _) => dtype,
        }
    }

    /// Short tag used in native symbol names (`f32`, `f64`, ...).
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::S32 => "s32",
            Self::S64 => "s64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F16 => "float16",
            Self::BF16 => "bfloat16",
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::S32 => "int32",
            Self::S64 => "int64",
        };
        f.write_str(name)
    }
}

/// Conversions between primitive floats.
pub trait IntermediateFp {
    /// Convert to `f64`.
    fn into_f64(self) -> f64;
    /// Convert from `f64`.
    fn from_f64(x: f64) -> Self;
}

impl IntermediateFp for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(x: f64) -> Self {
        x as Self
    }

    fn into_f64(self) -> f64 {
        f64::from(self)
    }
}

impl IntermediateFp for f64 {
    fn from_f64(x: Self) -> Self {
        x
    }

    fn into_f64(self) -> Self {
        self
    }
}

/// Floating-point element a [`Tensor`] can carry through the primitive.
///
/// Implemented for `f32` and `f64` only; these are the two dtypes the native
/// kernels exist for.
pub trait Float:
    IntermediateFp
    + Copy
    + Send
    + Sync
    + PartialOrd
    + fmt::Debug
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Descriptor tag of this element type.
    const DTYPE: DType;
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;
    /// One full turn, `2π`.
    const TWO_PI: Self;

    /// Euclidean remainder, always in `[0, rhs)` for positive `rhs` up to rounding.
    #[must_use]
    fn rem_euclid(self, rhs: Self) -> Self;

    /// Wraps a typed tensor into the dtype-erased [`Array`].
    fn into_array(tensor: Tensor<Self>) -> Array;

    /// Unwraps an [`Array`] of this dtype.
    ///
    /// # Errors
    ///
    /// [`KeplerError::UnexpectedDType`] if the array holds another dtype.
    fn from_array(array: Array) -> Result<Tensor<Self>, KeplerError>;

    /// Borrows the elements of a buffer of this dtype.
    fn buffer_slice(buffer: &Buffer) -> Option<&[Self]>;

    /// Mutably borrows the elements of a buffer of this dtype.
    fn buffer_slice_mut(buffer: &mut Buffer) -> Option<&mut [Self]>;
}

impl Float for f32 {
    const DTYPE: DType = DType::F32;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TWO_PI: Self = core::f32::consts::TAU;

    fn rem_euclid(self, rhs: Self) -> Self {
        Self::rem_euclid(self, rhs)
    }

    fn into_array(tensor: Tensor<Self>) -> Array {
        Array::F32(tensor)
    }

    fn from_array(array: Array) -> Result<Tensor<Self>, KeplerError> {
        match array {
            Array::F32(t) => Ok(t),
            other => Err(KeplerError::UnexpectedDType {
                expected: Self::DTYPE,
                found: other.dtype(),
            }),
        }
    }

    fn buffer_slice(buffer: &Buffer) -> Option<&[Self]> {
        match buffer {
            Buffer::F32(data) => Some(data),
            _ => None,
        }
    }

    fn buffer_slice_mut(buffer: &mut Buffer) -> Option<&mut [Self]> {
        match buffer {
            Buffer::F32(data) => Some(data),
            _ => None,
        }
    }
}

impl Float for f64 {
    const DTYPE: DType = DType::F64;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TWO_PI: Self = core::f64::consts::TAU;

    fn rem_euclid(self, rhs: Self) -> Self {
        Self::rem_euclid(self, rhs)
    }

    fn into_array(tensor: Tensor<Self>) -> Array {
        Array::F64(tensor)
    }

    fn from_array(array: Array) -> Result<Tensor<Self>, KeplerError> {
        match array {
            Array::F64(t) => Ok(t),
            other => Err(KeplerError::UnexpectedDType {
                expected: Self::DTYPE,
                found: other.dtype(),
            }),
        }
    }

    fn buffer_slice(buffer: &Buffer) -> Option<&[Self]> {
        match buffer {
            Buffer::F64(data) => Some(data),
            _ => None,
        }
    }

    fn buffer_slice_mut(buffer: &mut Buffer) -> Option<&mut [Self]> {
        match buffer {
            Buffer::F64(data) => Some(data),
            _ => None,
        }
    }
}
