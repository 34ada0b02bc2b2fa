//! Behavior with float64 support switched off. Every test here turns the
//! switch off and none turns it back on, so they may share the process.

use core::f64::consts::FRAC_PI_2;

use kepler_op::backend::{Platform, default_platform};
use kepler_op::config::{self, Config, ENABLE_X64_ENV};
use kepler_op::dtype::DType;
use kepler_op::tensors::{Array, Tensor};
use kepler_op::{Tangent, kepler_solve, kepler_solve_jvp};

fn disable_x64() {
    let config = Config::from_lookup(|key| (key == ENABLE_X64_ENV).then(|| "off".to_string()))
        .unwrap();
    config.apply();
    assert!(!config::enable_x64());
    assert_eq!(default_platform(), Platform::Cpu);
}

#[test]
fn float64_inputs_compute_in_float32() {
    disable_x64();
    let m = Array::from(Tensor::new(vec![2], vec![0.0f64, FRAC_PI_2]));
    let e = Array::from(Tensor::new(vec![2], vec![0.5f64, 0.0]));

    let (sin_e, cos_e) = kepler_solve(&m, &e).unwrap();
    assert_eq!(sin_e.dtype(), DType::F32);
    assert_eq!(cos_e.dtype(), DType::F32);

    let (sin_e, cos_e) = (sin_e.as_f32().unwrap(), cos_e.as_f32().unwrap());
    assert_eq!((sin_e.data[0], cos_e.data[0]), (0.0, 1.0));
    assert!((sin_e.data[1] - 1.0).abs() < 1e-6);
    assert!(cos_e.data[1].abs() < 1e-6);
}

#[test]
fn mixed_precision_inputs_are_accepted() {
    config::set_enable_x64(false);
    let m = Array::from(Tensor::new(vec![3], vec![0.3f32, 1.0, 2.0]));
    let e = Array::from(Tensor::scalar(0.2f64));

    let (sin_e, _) = kepler_solve(&m, &e).unwrap();
    assert_eq!(sin_e.dtype(), DType::F32);
    assert_eq!(sin_e.shape(), &[3]);
}

#[test]
fn tangents_follow_canonical_dtype() {
    config::set_enable_x64(false);
    let m = Array::from(Tensor::new(vec![2], vec![0.4f64, 2.5]));
    let e = Array::from(Tensor::new(vec![2], vec![0.0f64, 0.3]));

    let ((sin_e, _), (dsin, dcos)) =
        kepler_solve_jvp(&m, &e, Tangent::Value(m.zeros_like()), Tangent::Zero).unwrap();
    assert_eq!(sin_e.dtype(), DType::F32);
    assert_eq!(dsin.dtype(), DType::F32);
    assert_eq!(dcos.dtype(), DType::F32);

    let ones = Array::from(Tensor::new(vec![2], vec![1.0f64; 2]));
    let (_, (dsin, _)) = kepler_solve_jvp(&m, &e, Tangent::Value(ones), Tangent::Zero).unwrap();
    // e = 0 makes E = M, so d sin E / dM = cos M
    let dsin = dsin.as_f32().unwrap();
    assert!((f64::from(dsin.data[0]) - 0.4f64.cos()).abs() < 1e-6);
}
