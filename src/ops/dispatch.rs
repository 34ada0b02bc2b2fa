//! Backend Dispatcher
//!
//! Lowers one call of the primitive into a [`CustomCall`]: the exact native
//! symbol, operand list, layouts and opaque payload a backend kernel expects.
//!
//! The two platforms bind different calling conventions:
//!
//! | Platform | Operands                          | Opaque payload            |
//! |----------|-----------------------------------|---------------------------|
//! | CPU      | `count: s64[]`, `M`, `e`           | empty                     |
//! | GPU      | `M`, `e`                           | packed [`KeplerDescriptor`] |
//!
//! Both produce a `(sin E, cos E)` pair shaped like the operands, in canonical
//! row-major layout.
//!
//! # Example
//! ```rust
//! use kepler_op::abstract_eval::ShapedArray;
//! use kepler_op::backend::Platform;
//! use kepler_op::dtype::DType;
//! use kepler_op::ops::dispatch::{lower, CallOperand};
//!
//! let aval = ShapedArray::new(vec![55, 101], DType::F64);
//! let call = lower(Platform::Cpu, &aval, &aval).unwrap();
//! assert_eq!(call.target, "cpu_kepler_f64");
//! assert_eq!(call.operands[0], CallOperand::Literal(5555));
//! ```

use crate::abstract_eval::{ShapedArray, abstract_eval};
use crate::backend::Platform;
use crate::dtype::DType;
use crate::error::KeplerError;
use crate::registry;
use crate::shape::{element_count, row_major_layout};

use super::descriptor::KeplerDescriptor;

/// One operand of a lowered call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOperand {
    /// A rank-0 int64 constant baked into the call.
    Literal(i64),
    /// The n-th runtime argument of the primitive.
    Parameter(usize),
}

/// Shape, dtype and memory layout of one operand or result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayLayout {
    /// Element type.
    pub dtype: DType,
    /// Dimension sizes.
    pub dims: Vec<usize>,
    /// Dimension indices from fastest- to slowest-varying.
    pub minor_to_major: Vec<usize>,
}

impl ArrayLayout {
    /// Row-major layout for `aval`.
    #[must_use]
    pub fn row_major(aval: &ShapedArray) -> Self {
        Self {
            dtype: aval.dtype,
            dims: aval.shape.clone(),
            minor_to_major: row_major_layout(aval.rank()),
        }
    }

    /// Layout of a rank-0 int64 scalar.
    #[must_use]
    pub fn scalar_s64() -> Self {
        Self {
            dtype: DType::S64,
            dims: Vec::new(),
            minor_to_major: Vec::new(),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Fully specified native call of the primitive.
///
/// Built per translation and not retained beyond the
/// [`Executable`](crate::runtime::Executable) that wraps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCall {
    /// Platform whose convention this call follows.
    pub platform: Platform,
    /// Registered native symbol, e.g. `cpu_kepler_f32`.
    pub target: String,
    /// Operands in the order the kernel receives them.
    pub operands: Vec<CallOperand>,
    /// Layout of each operand, parallel to `operands`.
    pub operand_layouts: Vec<ArrayLayout>,
    /// Layout of each result; always `(sin E, cos E)`.
    pub result_layouts: Vec<ArrayLayout>,
    /// Backend payload; empty on CPU.
    pub opaque: Vec<u8>,
}

/// Native symbol for a platform/dtype pair.
///
/// # Errors
/// [`KeplerError::NotImplemented`] for anything but float32 and float64.
pub fn native_symbol(platform: Platform, dtype: DType) -> Result<String, KeplerError> {
    match dtype {
        DType::F32 | DType::F64 => Ok(format!("{}_kepler_{}", platform.tag(), dtype.tag())),
        other => Err(KeplerError::NotImplemented {
            dtype: other,
            platform,
        }),
    }
}

/// Lowers a call with the given operand descriptors for `platform`.
///
/// Abstract evaluation runs first, so mismatched operands never reach the
/// convention-specific code.
///
/// # Errors
/// - [`KeplerError::TypeMismatch`] / [`KeplerError::ShapeMismatch`] from
///   abstract evaluation.
/// - [`KeplerError::NotImplemented`] for unsupported dtypes.
/// - [`KeplerError::SizeOverflow`] if the element count overflows `i64`.
/// - [`KeplerError::Unavailable`] for GPU when no GPU kernels are registered.
pub fn lower(
    platform: Platform,
    mean_anomaly: &ShapedArray,
    eccentricity: &ShapedArray,
) -> Result<CustomCall, KeplerError> {
    let (out, _) = abstract_eval(mean_anomaly, eccentricity)?;
    let target = native_symbol(platform, out.dtype)?;
    let size = element_count(&out.shape)?;

    log::debug!("lowering {target} for {out} ({size} elements)");

    match platform {
        Platform::Cpu => Ok(lower_cpu(target, &out, size)),
        Platform::Gpu => lower_gpu(target, &out, size),
    }
}

/// Lowers for a platform named by its string tag.
///
/// # Errors
/// [`KeplerError::InvalidArgument`] for a tag other than `cpu`/`gpu`, otherwise
/// as [`lower`].
pub fn lower_for(
    tag: &str,
    mean_anomaly: &ShapedArray,
    eccentricity: &ShapedArray,
) -> Result<CustomCall, KeplerError> {
    lower(tag.parse()?, mean_anomaly, eccentricity)
}

fn lower_cpu(target: String, out: &ShapedArray, size: i64) -> CustomCall {
    let layout = ArrayLayout::row_major(out);
    CustomCall {
        platform: Platform::Cpu,
        target,
        operands: vec![
            CallOperand::Literal(size),
            CallOperand::Parameter(0),
            CallOperand::Parameter(1),
        ],
        operand_layouts: vec![ArrayLayout::scalar_s64(), layout.clone(), layout.clone()],
        result_layouts: vec![layout.clone(), layout],
        opaque: Vec::new(),
    }
}

fn lower_gpu(target: String, out: &ShapedArray, size: i64) -> Result<CustomCall, KeplerError> {
    if !registry::platform_available(Platform::Gpu) {
        return Err(KeplerError::Unavailable {
            platform: Platform::Gpu,
            reason: gpu_unavailable_reason().to_string(),
        });
    }

    let layout = ArrayLayout::row_major(out);
    Ok(CustomCall {
        platform: Platform::Gpu,
        target,
        operands: vec![CallOperand::Parameter(0), CallOperand::Parameter(1)],
        operand_layouts: vec![layout.clone(), layout.clone()],
        result_layouts: vec![layout.clone(), layout],
        opaque: KeplerDescriptor::new(size).pack(),
    })
}

const fn gpu_unavailable_reason() -> &'static str {
    if cfg!(feature = "wgpu") {
        "no GPU adapter could be acquired"
    } else {
        "crate was built without the `wgpu` feature"
    }
}
