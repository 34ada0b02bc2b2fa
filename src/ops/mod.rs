//! # Native Call Layer
//!
//! Everything below the graph-level rules: how a call to the primitive is
//! described for a backend, and the native kernels that execute it.
//!
//! ## Submodules
//!
//! - [`dispatch`] — lowering to a [`CustomCall`](dispatch::CustomCall) per platform
//! - [`descriptor`] — opaque payload carried by GPU calls
//! - [`cpu`] — multi-threaded CPU kernels (always built)
//! - [`wgpu`] *(opt-in)* — GPU compute kernels using `wgpu`
//!
//! ## Calling Convention
//!
//! Every kernel has the [`NativeKernel`] signature. Inputs and outputs are
//! flat row-major [`Buffer`]s in operand order; the opaque byte string is
//! empty on CPU and holds a packed [`KeplerDescriptor`](descriptor::KeplerDescriptor)
//! on GPU.
//!
//! ## Feature Flags
//!
//! - `wgpu` — Enables the `wgpu` (WebGPU) kernels

pub mod cpu;
pub mod descriptor;
pub mod dispatch;
#[cfg(feature = "wgpu")]
pub mod wgpu;

use crate::dtype::DType;
use crate::error::KeplerError;

/// Flat device-independent storage for one operand or result of a native call.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    /// float32 elements.
    F32(Vec<f32>),
    /// float64 elements.
    F64(Vec<f64>),
    /// int64 elements; used for the CPU element-count literal.
    S64(Vec<i64>),
}

impl Buffer {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::S64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element dtype.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::S64(_) => DType::S64,
        }
    }

    /// A zero-filled buffer of `len` elements of `dtype`.
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] for dtypes buffers cannot hold.
    pub fn zeros(dtype: DType, len: usize) -> Result<Self, KeplerError> {
        match dtype {
            DType::F32 => Ok(Self::F32(vec![0.0; len])),
            DType::F64 => Ok(Self::F64(vec![0.0; len])),
            DType::S64 => Ok(Self::S64(vec![0; len])),
            other => Err(KeplerError::InvalidArgument(format!(
                "no buffer representation for {other}"
            ))),
        }
    }
}

/// Signature shared by every registered native kernel.
///
/// `inputs` and `outputs` follow the operand and result order of the lowered
/// call; `opaque` is the call's backend payload.
pub type NativeKernel = fn(&[Buffer], &mut [Buffer], &[u8]) -> Result<(), KeplerError>;
