//! GPU calling convention, exercised through a host-side stand-in kernel so it
//! runs without a device. Lives in its own binary: registering a GPU target
//! makes the platform available for every test in the process.
#![cfg(not(feature = "wgpu"))]

use kepler_op::abstract_eval::ShapedArray;
use kepler_op::backend::Platform;
use kepler_op::dtype::DType;
use kepler_op::ops::descriptor::KeplerDescriptor;
use kepler_op::ops::dispatch::{self, CallOperand};
use kepler_op::ops::Buffer;
use kepler_op::registry::{self, register_custom_call_target};
use kepler_op::tensors::{Array, Tensor};
use kepler_op::{KeplerError, compile};

/// Writes the element count decoded from the opaque payload into both outputs.
fn echo_count(inputs: &[Buffer], outputs: &mut [Buffer], opaque: &[u8]) -> Result<(), KeplerError> {
    let n = KeplerDescriptor::unpack(opaque)?.count()?;
    assert_eq!(inputs.len(), 2, "count must not be passed as an operand");
    assert!(inputs.iter().all(|b| b.len() == n));
    for out in outputs.iter_mut() {
        *out = Buffer::F64(vec![n as f64; n]);
    }
    Ok(())
}

#[test]
fn gpu_calls_carry_count_in_opaque_payload() {
    register_custom_call_target("gpu_kepler_f64", echo_count, Platform::Gpu).unwrap();
    assert!(registry::platform_available(Platform::Gpu));

    let aval = ShapedArray::new(vec![2, 3], DType::F64);
    let call = dispatch::lower(Platform::Gpu, &aval, &aval).unwrap();
    assert_eq!(call.target, "gpu_kepler_f64");
    assert_eq!(
        call.operands,
        vec![CallOperand::Parameter(0), CallOperand::Parameter(1)]
    );
    assert_eq!(call.opaque, 6i64.to_le_bytes().to_vec());
    assert_eq!(call.operand_layouts.len(), 2);

    let m = Array::from(Tensor::new(vec![2, 3], vec![0.5f64; 6]));
    let e = Array::from(Tensor::new(vec![2, 3], vec![0.1f64; 6]));
    let (sin_e, cos_e) = compile(&aval, &aval, Platform::Gpu)
        .unwrap()
        .call(&m, &e)
        .unwrap();
    assert_eq!(sin_e.shape(), &[2, 3]);
    assert_eq!(sin_e.as_f64().unwrap().data, vec![6.0; 6]);
    assert_eq!(cos_e.as_f64().unwrap().data, vec![6.0; 6]);
}

#[test]
fn unregistered_gpu_dtype_has_no_kernel() {
    register_custom_call_target("gpu_kepler_f64", echo_count, Platform::Gpu).unwrap();

    // the platform is available, but only the f64 symbol is bound
    let aval = ShapedArray::new(vec![4], DType::F32);
    let exe = compile(&aval, &aval, Platform::Gpu).unwrap();
    let x = Array::from(Tensor::new(vec![4], vec![0.1f32; 4]));
    assert!(matches!(
        exe.call(&x, &x),
        Err(KeplerError::Unavailable {
            platform: Platform::Gpu,
            ..
        })
    ));
}
