//! kepler_op: a differentiable, batchable Kepler-equation primitive.
//!
//! Solves `M = E - e·sin E` for the eccentric anomaly `E` element-wise and
//! returns `(sin E, cos E)`, with native CPU kernels and optional GPU kernels.
//!
//! # Features
//!
//! - Broadcasting of mean anomaly and eccentricity, with `M` wrapped into `[0, 2π)`.
//! - Graph-level shape/dtype checks before any native call is built.
//! - Lowering to per-platform native calls (`cpu_kepler_f32`, `gpu_kepler_f64`, ...).
//! - Forward-mode derivatives from implicit differentiation, composable to any order.
//! - A batching rule so the primitive can be mapped over a batch axis.
//!
//! # Modules
//!
//! - [`tensors`] — Tensor and dtype-erased array types.
//! - [`normalize`] — Broadcasting and mean-anomaly wrapping.
//! - [`abstract_eval`] — Shape/dtype rule.
//! - [`ops`] — Lowering, opaque descriptors and the native kernels.
//! - [`registry`] — Native symbol table.
//! - [`runtime`] — Compiled calls.
//! - [`jvp`] — Differentiation rule.
//! - [`batching`] — Batching rule.
//! - [`primitive`] — The primitive's registration record.
//! - [`config`] / [`backend`] — Default platform and x64 switch.
//!
//! # Feature Flags
//!
//! - `wgpu` — Enables the GPU kernels (`wgpu` + WGSL)
//!
//! # Example
//!
//! ```rust
//! use kepler_op::kepler_solve;
//! use kepler_op::tensors::{Array, Tensor};
//!
//! let m = Array::from(Tensor::new(vec![2], vec![0.0, core::f64::consts::FRAC_PI_2]));
//! let e = Array::from(Tensor::new(vec![2], vec![0.5, 0.0]));
//! let (sin_e, cos_e) = kepler_solve(&m, &e).unwrap();
//! assert_eq!(sin_e.as_f64().unwrap().data[0], 0.0);
//! assert_eq!(cos_e.as_f64().unwrap().data[0], 1.0);
//! ```

pub mod abstract_eval;
pub mod backend;
pub mod batching;
pub mod config;
pub mod dtype;
pub mod error;
pub mod jvp;
pub mod normalize;
pub mod ops;
pub mod primitive;
pub mod registry;
pub mod runtime;
pub mod shape;
pub mod tensors;

pub use batching::batch_apply;
pub use error::KeplerError;
pub use jvp::{JvpOutput, Tangent};
pub use runtime::{Executable, compile};
pub use tensors::{Array, Tensor};

use normalize::normalize_inputs;
use primitive::kepler_primitive;

/// Solves Kepler's equation element-wise, returning `(sin E, cos E)`.
///
/// The inputs are broadcast to a common shape and the mean anomaly is wrapped
/// into `[0, 2π)`. Both must be float32 or both float64 after canonicalization.
///
/// # Errors
/// - [`KeplerError::ShapeError`] if the shapes are not broadcast-compatible.
/// - [`KeplerError::TypeMismatch`] if the dtypes differ.
/// - [`KeplerError::Unavailable`] if the default platform has no kernels.
pub fn kepler_solve(
    mean_anomaly: &Array,
    eccentricity: &Array,
) -> Result<(Array, Array), KeplerError> {
    let (mean_anomaly, eccentricity) = normalize_inputs(mean_anomaly, eccentricity)?;
    kepler_primitive().bind(&mean_anomaly, &eccentricity)
}

/// Forward-mode derivative of [`kepler_solve`].
///
/// Returns `((sin E, cos E), (d sin E, d cos E))` for input tangents
/// `(dM, de)`. Value tangents are broadcast to the common input shape; the
/// wrap of `M` has unit derivative, so `dM` passes through unchanged.
///
/// # Errors
/// As [`kepler_solve`], plus [`KeplerError::UnexpectedDType`] if a tangent's
/// dtype differs from its primal's and [`KeplerError::ShapeError`] if a
/// tangent does not broadcast to the common shape.
pub fn kepler_solve_jvp(
    mean_anomaly: &Array,
    eccentricity: &Array,
    mean_anomaly_dot: Tangent<Array>,
    eccentricity_dot: Tangent<Array>,
) -> Result<JvpOutput<Array>, KeplerError> {
    let (mean_anomaly, eccentricity) = normalize_inputs(mean_anomaly, eccentricity)?;
    let x64 = config::enable_x64();
    let shape = mean_anomaly.shape().to_vec();
    let prepare = |t: Array| t.canonicalize(x64).broadcast_to(&shape);

    let tangents = (
        mean_anomaly_dot.try_map(prepare)?,
        eccentricity_dot.try_map(prepare)?,
    );
    (kepler_primitive().jvp)((&mean_anomaly, &eccentricity), tangents)
}
