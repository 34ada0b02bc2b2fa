//! Execution of lowered calls.
//!
//! [`compile`] runs abstract evaluation and lowering once and returns an
//! [`Executable`]; [`Executable::call`] marshals arrays into native buffers,
//! invokes the registered kernel and wraps the results back into arrays.
//! The eager path in [`Primitive::bind`](crate::primitive::Primitive::bind) is
//! a compile followed by a call.

use crate::abstract_eval::ShapedArray;
use crate::backend::Platform;
use crate::error::KeplerError;
use crate::ops::Buffer;
use crate::ops::dispatch::{CallOperand, CustomCall};
use crate::primitive::kepler_primitive;
use crate::registry;
use crate::tensors::{Array, Tensor};

/// A lowered call bound to fixed argument shapes and dtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    call: CustomCall,
    in_avals: [ShapedArray; 2],
    out_avals: [ShapedArray; 2],
}

/// Compiles the primitive for the given argument descriptors on `platform`.
///
/// Argument dtypes are canonicalized under the current x64 switch, so the
/// executable expects canonical arrays.
///
/// # Errors
/// Anything abstract evaluation or lowering reports; see
/// [`lower`](crate::ops::dispatch::lower).
pub fn compile(
    mean_anomaly: &ShapedArray,
    eccentricity: &ShapedArray,
    platform: Platform,
) -> Result<Executable, KeplerError> {
    let primitive = kepler_primitive();
    let (sin_aval, cos_aval) = (primitive.abstract_eval)(mean_anomaly, eccentricity)?;
    let call = (primitive.translation(platform))(mean_anomaly, eccentricity)?;

    log::debug!("compiled {} for {sin_aval}", call.target);

    let in_aval = ShapedArray::new(mean_anomaly.shape.clone(), sin_aval.dtype);
    Ok(Executable {
        call,
        in_avals: [in_aval.clone(), in_aval],
        out_avals: [sin_aval, cos_aval],
    })
}

impl Executable {
    /// The lowered native call.
    #[must_use]
    pub const fn custom_call(&self) -> &CustomCall {
        &self.call
    }

    /// Descriptors the arguments must match.
    #[must_use]
    pub const fn in_avals(&self) -> &[ShapedArray; 2] {
        &self.in_avals
    }

    /// Descriptors of `(sin E, cos E)`.
    #[must_use]
    pub const fn out_avals(&self) -> &[ShapedArray; 2] {
        &self.out_avals
    }

    /// Executes the call on concrete arrays.
    ///
    /// # Errors
    /// - [`KeplerError::UnexpectedDType`] if an argument's dtype differs from
    ///   the compiled one.
    /// - [`KeplerError::ShapeMismatch`] if an argument's shape differs from
    ///   the compiled one.
    /// - [`KeplerError::Unavailable`] if the target symbol is not registered.
    /// - [`KeplerError::Kernel`] if the kernel fails.
    pub fn call(
        &self,
        mean_anomaly: &Array,
        eccentricity: &Array,
    ) -> Result<(Array, Array), KeplerError> {
        self.check_args(mean_anomaly, eccentricity)?;

        let kernel = registry::lookup(&self.call.target, self.call.platform).ok_or_else(|| {
            KeplerError::Unavailable {
                platform: self.call.platform,
                reason: format!("no kernel registered for `{}`", self.call.target),
            }
        })?;

        let args = [mean_anomaly, eccentricity];
        let inputs = self
            .call
            .operands
            .iter()
            .map(|operand| match *operand {
                CallOperand::Literal(value) => Ok(Buffer::S64(vec![value])),
                CallOperand::Parameter(i) => args.get(i).map(|a| to_buffer(a)).ok_or_else(|| {
                    KeplerError::kernel(&self.call.target, format!("no argument {i}"))
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut outputs = self
            .call
            .result_layouts
            .iter()
            .map(|layout| Buffer::zeros(layout.dtype, layout.numel()))
            .collect::<Result<Vec<_>, _>>()?;

        kernel(&inputs, &mut outputs, &self.call.opaque)?;

        let mut results = outputs
            .into_iter()
            .zip(&self.out_avals)
            .map(|(buffer, aval)| to_array(&self.call.target, buffer, &aval.shape));
        match (results.next(), results.next()) {
            (Some(sin_e), Some(cos_e)) => Ok((sin_e?, cos_e?)),
            _ => Err(KeplerError::kernel(&self.call.target, "expected two results")),
        }
    }

    fn check_args(&self, mean_anomaly: &Array, eccentricity: &Array) -> Result<(), KeplerError> {
        let expected = &self.in_avals[0];
        for arg in [mean_anomaly, eccentricity] {
            if arg.dtype() != expected.dtype {
                return Err(KeplerError::UnexpectedDType {
                    expected: expected.dtype,
                    found: arg.dtype(),
                });
            }
        }
        if mean_anomaly.shape() != expected.shape.as_slice()
            || eccentricity.shape() != expected.shape.as_slice()
        {
            return Err(KeplerError::ShapeMismatch {
                mean_anomaly: mean_anomaly.shape().to_vec(),
                eccentricity: eccentricity.shape().to_vec(),
            });
        }
        Ok(())
    }
}

fn to_buffer(array: &Array) -> Buffer {
    match array {
        Array::F32(t) => Buffer::F32(t.data.clone()),
        Array::F64(t) => Buffer::F64(t.data.clone()),
    }
}

fn to_array(symbol: &str, buffer: Buffer, shape: &[usize]) -> Result<Array, KeplerError> {
    match buffer {
        Buffer::F32(data) => Ok(Array::F32(Tensor::try_new(shape, data)?)),
        Buffer::F64(data) => Ok(Array::F64(Tensor::try_new(shape, data)?)),
        Buffer::S64(_) => Err(KeplerError::kernel(symbol, "kernel produced an integer result")),
    }
}
