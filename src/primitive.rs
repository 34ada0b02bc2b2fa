//! The Kepler primitive.
//!
//! A process-wide, immutable record binding the primitive's name and arity to
//! its rules: abstract evaluation, one translation per platform, the
//! forward-mode derivative and the batching rule. It is created on first use
//! and never mutated afterwards; first use also applies the environment
//! configuration and registers the native kernels.

use std::sync::OnceLock;

use crate::abstract_eval::{ShapedArray, abstract_eval};
use crate::backend::{Platform, default_platform};
use crate::batching::{BatchOutput, batch_rule};
use crate::config;
use crate::error::KeplerError;
use crate::jvp::{JvpOutput, Tangent, kepler_jvp};
use crate::ops::dispatch::{CustomCall, lower};
use crate::registry;
use crate::runtime;
use crate::tensors::Array;

/// Shape/dtype rule.
pub type AbstractEvalRule =
    fn(&ShapedArray, &ShapedArray) -> Result<(ShapedArray, ShapedArray), KeplerError>;
/// Lowering rule for one platform.
pub type TranslationRule = fn(&ShapedArray, &ShapedArray) -> Result<CustomCall, KeplerError>;
/// Forward-mode derivative rule.
pub type JvpRule =
    fn((&Array, &Array), (Tangent<Array>, Tangent<Array>)) -> Result<JvpOutput<Array>, KeplerError>;
/// Vectorization rule.
pub type BatchRule = fn((&Array, &Array), (usize, usize)) -> Result<BatchOutput, KeplerError>;

/// Registration record of a primitive.
#[derive(Debug, Clone, Copy)]
pub struct Primitive {
    /// Primitive name.
    pub name: &'static str,
    /// Number of operands.
    pub num_inputs: usize,
    /// Number of results.
    pub num_outputs: usize,
    /// Whether results are returned as a tuple.
    pub multiple_results: bool,
    /// See [`abstract_eval`].
    pub abstract_eval: AbstractEvalRule,
    /// Lowering for [`Platform::Cpu`].
    pub cpu_translation: TranslationRule,
    /// Lowering for [`Platform::Gpu`].
    pub gpu_translation: TranslationRule,
    /// See [`kepler_jvp`].
    pub jvp: JvpRule,
    /// See [`batch_rule`].
    pub batch: BatchRule,
}

impl Primitive {
    /// The lowering rule for `platform`.
    #[must_use]
    pub const fn translation(&self, platform: Platform) -> TranslationRule {
        match platform {
            Platform::Cpu => self.cpu_translation,
            Platform::Gpu => self.gpu_translation,
        }
    }

    /// Evaluates the primitive eagerly on the default platform.
    ///
    /// Inputs are canonicalized under the x64 switch but not broadcast or
    /// wrapped; they must already share one shape and dtype.
    ///
    /// # Errors
    /// Anything compilation or execution reports.
    pub fn bind(&self, mean_anomaly: &Array, eccentricity: &Array) -> Result<(Array, Array), KeplerError> {
        let x64 = config::enable_x64();
        let mean_anomaly = mean_anomaly.clone().canonicalize(x64);
        let eccentricity = eccentricity.clone().canonicalize(x64);

        let executable = runtime::compile(
            &mean_anomaly.aval(),
            &eccentricity.aval(),
            default_platform(),
        )?;
        executable.call(&mean_anomaly, &eccentricity)
    }
}

fn cpu_translation(
    mean_anomaly: &ShapedArray,
    eccentricity: &ShapedArray,
) -> Result<CustomCall, KeplerError> {
    lower(Platform::Cpu, mean_anomaly, eccentricity)
}

fn gpu_translation(
    mean_anomaly: &ShapedArray,
    eccentricity: &ShapedArray,
) -> Result<CustomCall, KeplerError> {
    lower(Platform::Gpu, mean_anomaly, eccentricity)
}

static KEPLER: OnceLock<Primitive> = OnceLock::new();

/// The Kepler primitive, created on first call.
pub fn kepler_primitive() -> &'static Primitive {
    KEPLER.get_or_init(|| {
        config::apply_env();
        registry::initialize();
        log::debug!("registered primitive kepler ({})", config::current().platform);

        Primitive {
            name: "kepler",
            num_inputs: 2,
            num_outputs: 2,
            multiple_results: true,
            abstract_eval,
            cpu_translation,
            gpu_translation,
            jvp: kepler_jvp,
            batch: batch_rule,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_is_stable() {
        let a = kepler_primitive();
        let b = kepler_primitive();
        assert!(core::ptr::eq(a, b));
        assert_eq!(a.name, "kepler");
        assert_eq!((a.num_inputs, a.num_outputs), (2, 2));
        assert!(a.multiple_results);
    }
}
