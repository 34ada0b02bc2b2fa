//! CPU-native Kepler kernels.
//!
//! The reference implementation of the native ABI: one Newton solve of
//! `E - e·sin E = M` per element, run in parallel with `rayon`, writing
//! `sin E` and `cos E` into the two output buffers.
//!
//! Both dtypes solve in `f64` and round the result, so the float32 kernel is
//! as accurate as its inputs allow.
//!
//! # Domain
//! Elements with a non-finite mean anomaly, or an eccentricity outside
//! `[0, 1)`, produce `NaN` in both outputs. Nothing is rejected.

use rayon::prelude::*;

use crate::dtype::Float;
use crate::error::KeplerError;

use super::{Buffer, NativeKernel};

/// Native symbol of the float32 CPU kernel.
pub const CPU_KEPLER_F32: &str = "cpu_kepler_f32";
/// Native symbol of the float64 CPU kernel.
pub const CPU_KEPLER_F64: &str = "cpu_kepler_f64";

const MAX_ITERATIONS: usize = 50;
const TOLERANCE: f64 = 1e-15;

/// Solves Kepler's equation for one element, returning `(sin E, cos E)`.
///
/// Starts from Danby's guess `M + 0.85·e·sign(sin M)` and iterates Newton
/// until the step is below `1e-15` relative to `E`.
///
/// # Example
/// ```rust
/// use kepler_op::ops::cpu::solve;
/// let (s, c) = solve(0.0, 0.5);
/// assert_eq!((s, c), (0.0, 1.0));
/// ```
#[must_use]
pub fn solve(mean_anomaly: f64, eccentricity: f64) -> (f64, f64) {
    if !mean_anomaly.is_finite() || !(0.0..1.0).contains(&eccentricity) {
        return (f64::NAN, f64::NAN);
    }

    let mut ecc_anom = mean_anomaly + 0.85 * eccentricity * sign(mean_anomaly.sin());
    for _ in 0..MAX_ITERATIONS {
        let step = newton_step(mean_anomaly, eccentricity, ecc_anom);
        ecc_anom -= step;
        if step.abs() <= TOLERANCE * ecc_anom.abs().max(1.0) {
            break;
        }
    }
    ecc_anom.sin_cos()
}

/// Polishes an approximate `(sin E, cos E)` with two `f64` Newton steps.
///
/// Used to lift single-precision device results to double precision.
#[must_use]
pub fn refine(mean_anomaly: f64, eccentricity: f64, sin_e: f64, cos_e: f64) -> (f64, f64) {
    if !mean_anomaly.is_finite() || !(0.0..1.0).contains(&eccentricity) {
        return (f64::NAN, f64::NAN);
    }

    // recover the branch of E closest to M
    let mut ecc_anom = sin_e.atan2(cos_e);
    ecc_anom += core::f64::consts::TAU * ((mean_anomaly - ecc_anom) / core::f64::consts::TAU).round();

    for _ in 0..2 {
        ecc_anom -= newton_step(mean_anomaly, eccentricity, ecc_anom);
    }
    ecc_anom.sin_cos()
}

fn newton_step(mean_anomaly: f64, eccentricity: f64, ecc_anom: f64) -> f64 {
    let (s, c) = ecc_anom.sin_cos();
    (ecc_anom - eccentricity * s - mean_anomaly) / (1.0 - eccentricity * c)
}

// unlike f64::signum, zero maps to zero
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// float32 CPU kernel.
///
/// Inputs: `[count: s64[1], M: f32[count], e: f32[count]]`.
/// Outputs: `[sin E: f32[count], cos E: f32[count]]`.
///
/// # Errors
/// [`KeplerError::Kernel`] if buffer count, dtype or length disagree with the ABI.
pub fn cpu_kepler_f32(
    inputs: &[Buffer],
    outputs: &mut [Buffer],
    _opaque: &[u8],
) -> Result<(), KeplerError> {
    run::<f32>(CPU_KEPLER_F32, inputs, outputs)
}

/// float64 CPU kernel.
///
/// Same ABI as [`cpu_kepler_f32`] with `f64` data buffers.
///
/// # Errors
/// [`KeplerError::Kernel`] if buffer count, dtype or length disagree with the ABI.
pub fn cpu_kepler_f64(
    inputs: &[Buffer],
    outputs: &mut [Buffer],
    _opaque: &[u8],
) -> Result<(), KeplerError> {
    run::<f64>(CPU_KEPLER_F64, inputs, outputs)
}

/// Symbols exported by this module, for one-time registration.
#[must_use]
pub fn registrations() -> Vec<(&'static str, NativeKernel)> {
    vec![
        (CPU_KEPLER_F32, cpu_kepler_f32 as NativeKernel),
        (CPU_KEPLER_F64, cpu_kepler_f64 as NativeKernel),
    ]
}

fn run<T: Float>(symbol: &str, inputs: &[Buffer], outputs: &mut [Buffer]) -> Result<(), KeplerError> {
    let [count, mean_anomaly, eccentricity] = inputs else {
        return Err(KeplerError::kernel(
            symbol,
            format!("expected 3 inputs, got {}", inputs.len()),
        ));
    };
    let n = read_count(symbol, count)?;
    let mean_anomaly = data::<T>(symbol, mean_anomaly, n)?;
    let eccentricity = data::<T>(symbol, eccentricity, n)?;

    let outputs_len = outputs.len();
    let [sin_out, cos_out] = outputs else {
        return Err(KeplerError::kernel(
            symbol,
            format!("expected 2 outputs, got {outputs_len}"),
        ));
    };
    let sin_out = data_mut::<T>(symbol, sin_out, n)?;
    let cos_out = data_mut::<T>(symbol, cos_out, n)?;

    sin_out
        .par_iter_mut()
        .zip(cos_out.par_iter_mut())
        .zip(mean_anomaly.par_iter().zip(eccentricity.par_iter()))
        .for_each(|((s, c), (&m, &e))| {
            let (sin_e, cos_e) = solve(m.into_f64(), e.into_f64());
            *s = T::from_f64(sin_e);
            *c = T::from_f64(cos_e);
        });

    Ok(())
}

fn read_count(symbol: &str, buffer: &Buffer) -> Result<usize, KeplerError> {
    let Buffer::S64(count) = buffer else {
        return Err(KeplerError::kernel(
            symbol,
            format!("element count must be int64, got {}", buffer.dtype()),
        ));
    };
    let &[n] = count.as_slice() else {
        return Err(KeplerError::kernel(
            symbol,
            "element count must be a single scalar",
        ));
    };
    usize::try_from(n).map_err(|_| KeplerError::kernel(symbol, format!("negative element count {n}")))
}

pub(crate) fn data<'a, T: Float>(
    symbol: &str,
    buffer: &'a Buffer,
    n: usize,
) -> Result<&'a [T], KeplerError> {
    let slice = T::buffer_slice(buffer).ok_or_else(|| {
        KeplerError::kernel(
            symbol,
            format!("expected {} buffer, got {}", T::DTYPE, buffer.dtype()),
        )
    })?;
    check_len(symbol, slice.len(), n)?;
    Ok(slice)
}

pub(crate) fn data_mut<'a, T: Float>(
    symbol: &str,
    buffer: &'a mut Buffer,
    n: usize,
) -> Result<&'a mut [T], KeplerError> {
    let dtype = buffer.dtype();
    let slice = T::buffer_slice_mut(buffer).ok_or_else(|| {
        KeplerError::kernel(symbol, format!("expected {} buffer, got {dtype}", T::DTYPE))
    })?;
    check_len(symbol, slice.len(), n)?;
    Ok(slice)
}

fn check_len(symbol: &str, len: usize, n: usize) -> Result<(), KeplerError> {
    if len == n {
        Ok(())
    } else {
        Err(KeplerError::kernel(
            symbol,
            format!("buffer holds {len} elements, count says {n}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use core::f64::consts::{FRAC_PI_2, PI};

    use super::*;

    #[test]
    fn circular_orbit_is_identity() {
        let (s, c) = solve(FRAC_PI_2, 0.0);
        assert!((s - 1.0).abs() < 1e-15);
        assert!(c.abs() < 1e-15);
    }

    #[test]
    fn satisfies_keplers_equation() {
        for &e in &[0.1, 0.5, 0.9, 0.99] {
            for i in 0..64 {
                let m = f64::from(i) * PI / 32.0;
                let (s, c) = solve(m, e);
                let ecc_anom = s.atan2(c).rem_euclid(core::f64::consts::TAU);
                let residual = (ecc_anom - e * s - m).rem_euclid(core::f64::consts::TAU);
                let residual = residual.min(core::f64::consts::TAU - residual);
                assert!(residual < 1e-12, "e={e} m={m} residual={residual}");
            }
        }
    }

    #[test]
    fn out_of_domain_is_nan() {
        assert!(solve(1.0, 1.0).0.is_nan());
        assert!(solve(1.0, -0.1).1.is_nan());
        assert!(solve(f64::INFINITY, 0.5).0.is_nan());
        assert!(solve(1.0, f64::NAN).0.is_nan());
    }

    #[test]
    fn refine_recovers_double_precision() {
        let (m, e) = (2.5, 0.7);
        let exact = solve(m, e);
        let coarse = (f64::from(exact.0 as f32) + 1e-6, f64::from(exact.1 as f32) - 1e-6);
        let (s, c) = refine(m, e, coarse.0, coarse.1);
        assert!((s - exact.0).abs() < 1e-14);
        assert!((c - exact.1).abs() < 1e-14);
    }

    #[test]
    fn kernel_fills_both_outputs() {
        let inputs = [
            Buffer::S64(vec![2]),
            Buffer::F64(vec![0.0, FRAC_PI_2]),
            Buffer::F64(vec![0.5, 0.0]),
        ];
        let mut outputs = [Buffer::F64(vec![0.0; 2]), Buffer::F64(vec![0.0; 2])];
        cpu_kepler_f64(&inputs, &mut outputs, &[]).unwrap();

        let Buffer::F64(s) = &outputs[0] else { panic!() };
        let Buffer::F64(c) = &outputs[1] else { panic!() };
        assert_eq!(s[0], 0.0);
        assert_eq!(c[0], 1.0);
        assert!((s[1] - 1.0).abs() < 1e-15);
    }

    #[test]
    fn kernel_rejects_dtype_and_length_mismatch() {
        let mut outputs = [Buffer::F32(vec![0.0; 2]), Buffer::F32(vec![0.0; 2])];
        let wrong_dtype = [
            Buffer::S64(vec![2]),
            Buffer::F64(vec![0.0; 2]),
            Buffer::F64(vec![0.0; 2]),
        ];
        assert!(matches!(
            cpu_kepler_f32(&wrong_dtype, &mut outputs, &[]),
            Err(KeplerError::Kernel { .. })
        ));

        let wrong_len = [
            Buffer::S64(vec![3]),
            Buffer::F32(vec![0.0; 2]),
            Buffer::F32(vec![0.0; 2]),
        ];
        assert!(cpu_kepler_f32(&wrong_len, &mut outputs, &[]).is_err());
    }
}
