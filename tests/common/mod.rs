//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use kepler_op::dtype::DType;
use kepler_op::tensors::{Array, Tensor};

pub const N_ECC: usize = 55;
pub const N_ANOM: usize = 101;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `n` evenly spaced samples over `[start, end]`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Grid of Kepler problems with known solutions.
///
/// Rows run over eccentricities in `[0, 0.9]`, columns over eccentric
/// anomalies in `[-π, π]`; `mean_anomaly` is built from them so the solution
/// is known exactly.
pub struct KeplerData {
    /// `[N_ECC, N_ANOM]`.
    pub mean_anomaly: Array,
    /// `[N_ECC]`.
    pub eccentricity: Array,
    /// `[N_ECC, 1]`.
    pub eccentricity_column: Array,
    /// `[N_ECC, N_ANOM]`, eccentricity repeated along each row.
    pub eccentricity_full: Array,
    /// Row-major `[N_ECC, N_ANOM]` true eccentric anomalies.
    pub true_ecc_anom: Vec<f64>,
}

pub fn kepler_data(dtype: DType) -> KeplerData {
    let ecc = linspace(0.0, 0.9, N_ECC);
    let anom = linspace(-core::f64::consts::PI, core::f64::consts::PI, N_ANOM);

    let mut mean_anomaly = Vec::with_capacity(N_ECC * N_ANOM);
    let mut ecc_full = Vec::with_capacity(N_ECC * N_ANOM);
    let mut true_ecc_anom = Vec::with_capacity(N_ECC * N_ANOM);
    for &e in &ecc {
        for &ea in &anom {
            mean_anomaly.push(ea - e * ea.sin());
            ecc_full.push(e);
            true_ecc_anom.push(ea);
        }
    }

    KeplerData {
        mean_anomaly: array(dtype, vec![N_ECC, N_ANOM], mean_anomaly),
        eccentricity: array(dtype, vec![N_ECC], ecc.clone()),
        eccentricity_column: array(dtype, vec![N_ECC, 1], ecc),
        eccentricity_full: array(dtype, vec![N_ECC, N_ANOM], ecc_full),
        true_ecc_anom,
    }
}

/// Builds an array of `dtype` from `f64` data.
pub fn array(dtype: DType, shape: Vec<usize>, data: Vec<f64>) -> Array {
    let t = Tensor::new(shape, data);
    match dtype {
        DType::F32 => Array::F32(t.cast()),
        DType::F64 => Array::F64(t),
        other => panic!("no test arrays for {other}"),
    }
}

/// Widens any array to `f64` data.
pub fn to_f64(a: &Array) -> Vec<f64> {
    match a {
        Array::F32(t) => t.data.iter().map(|&x| f64::from(x)).collect(),
        Array::F64(t) => t.data.clone(),
    }
}

/// Checks solver output against the true eccentric anomalies.
pub fn check_kepler(sin_e: &Array, cos_e: &Array, true_ecc_anom: &[f64]) {
    let (sin_e, cos_e) = (to_f64(sin_e), to_f64(cos_e));
    assert!(sin_e.iter().all(|x| x.is_finite()));
    assert!(cos_e.iter().all(|x| x.is_finite()));
    assert_close(&sin_e, &true_ecc_anom.iter().map(|x| x.sin()).collect::<Vec<_>>(), 1e-5);
    assert_close(&cos_e, &true_ecc_anom.iter().map(|x| x.cos()).collect::<Vec<_>>(), 1e-5);
}

pub fn assert_close(actual: &[f64], expected: &[f64], atol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, b)) in actual.iter().zip(expected).enumerate() {
        assert!((a - b).abs() <= atol, "element {i}: {a} vs {b} (atol {atol})");
    }
}

/// Asserts `|a - b| <= tol · (1 + |b|)` element-wise.
pub fn assert_rel_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, b)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - b).abs() <= tol * (1.0 + b.abs()),
            "element {i}: {a} vs {b} (tol {tol})"
        );
    }
}

/// Central finite difference of a vector-valued `f` along `direction`.
pub fn finite_diff_directional<F>(f: F, point: &[f64], direction: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let plus: Vec<f64> = point.iter().zip(direction).map(|(x, v)| x + eps * v).collect();
    let minus: Vec<f64> = point.iter().zip(direction).map(|(x, v)| x - eps * v).collect();
    f(&plus)
        .iter()
        .zip(f(&minus))
        .map(|(p, m)| (p - m) / (2.0 * eps))
        .collect()
}
