use kepler_op::{tensors::{Array, Tensor}, tensor};
use kepler_op::dtype::DType;
use kepler_op::normalize::{broadcast_arrays, normalize_inputs, wrap_mean_anomaly};
use kepler_op::KeplerError;

#[test]
fn test_tensor_creation() {
    let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    });
    assert!(result.is_err());
    assert!(Tensor::try_new(vec![2, 2], vec![1.0, 2.0, 3.0]).is_err());
}

#[test]
fn test_elementwise_arithmetic() {
    let a = tensor!([1.0, 2.0, 3.0]);
    let b = tensor!([0.5, 0.5, 2.0]);
    assert_eq!((&a + &b).data, vec![1.5, 2.5, 5.0]);
    assert_eq!((&a - &b).data, vec![0.5, 1.5, 1.0]);
    assert_eq!((&a * &b).data, vec![0.5, 1.0, 6.0]);
    assert_eq!((&a / &b).data, vec![2.0, 4.0, 1.5]);
    assert_eq!((-&a).data, vec![-1.0, -2.0, -3.0]);
}

#[test]
fn test_broadcast_column_against_row() {
    let m = Array::from(Tensor::new(vec![3], vec![0.1, 0.2, 0.3]));
    let e = Array::from(Tensor::new(vec![2, 1], vec![0.0, 0.5]));
    let (m, e) = broadcast_arrays(&m, &e).unwrap();
    assert_eq!(m.shape(), &[2, 3]);
    assert_eq!(e.as_f64().unwrap().data, vec![0.0, 0.0, 0.0, 0.5, 0.5, 0.5]);
}

#[test]
fn test_broadcast_incompatible() {
    let m = Array::from(Tensor::new(vec![3], vec![0.0f32; 3]));
    let e = Array::from(Tensor::new(vec![2], vec![0.0f32; 2]));
    assert!(matches!(
        broadcast_arrays(&m, &e),
        Err(KeplerError::ShapeError { .. })
    ));
}

#[test]
fn test_wrap_keeps_dtype() {
    let m = Array::from(Tensor::new(vec![2], vec![-1.0f32, 7.0]));
    let w = wrap_mean_anomaly(&m);
    assert_eq!(w.dtype(), DType::F32);
    let w = w.as_f32().unwrap();
    assert!(w.data.iter().all(|&x| (0.0..core::f32::consts::TAU).contains(&x)));
}

#[test]
fn test_normalize_keeps_mixed_dtypes() {
    let m = Array::from(tensor!([1.0f32]));
    let e = Array::from(tensor!([0.1f64, 0.2f64]));
    let (m, e) = normalize_inputs(&m, &e).unwrap();
    assert_eq!((m.dtype(), e.dtype()), (DType::F32, DType::F64));
    assert_eq!(m.shape(), &[2]);
}
