//! GPU-accelerated Kepler kernels using WGPU.
//!
//! This module implements the `gpu_kepler_*` native symbols on a WGSL compute
//! shader. It handles GPU context initialization, shader validation and
//! pipeline creation (once, via `lazy_static`), and the dispatch of one call:
//!
//! - upload `M` and `e` as `f32` storage buffers
//! - run one invocation per element over a 2-D workgroup grid
//! - read `sin E` and `cos E` back through a staging buffer
//!
//! The element count comes from the opaque [`KeplerDescriptor`], never from an
//! operand. Elements outside the solver's domain are set to `NaN` on the host
//! after readback, matching the CPU kernels.
//!
//! The shader is single precision. `gpu_kepler_f64` runs it on downcast inputs
//! and polishes every element with two `f64` Newton steps on the host.

use briny::prelude::*;
use rayon::prelude::*;
use thiserror::Error;
use wgpu::util::DeviceExt;

use crate::backend::Platform;
use crate::error::KeplerError;

use super::cpu::{data, data_mut, refine};
use super::descriptor::KeplerDescriptor;
use super::{Buffer, NativeKernel};

const KEPLER: &str = include_str!("shaders/kepler.wgsl");

const WORKGROUP_SIZE: u32 = 64;
const MAX_GROUPS_PER_DIM: u32 = 65_535;

/// Native symbol of the float32 GPU kernel.
pub const GPU_KEPLER_F32: &str = "gpu_kepler_f32";
/// Native symbol of the float64 GPU kernel.
pub const GPU_KEPLER_F64: &str = "gpu_kepler_f64";

/// Basic wrapper for GPU failures.
#[derive(Debug, Error)]
pub enum GpuError {
    /// An error in requesting the adapter.
    #[error("adapter error: {0}")]
    Adapter(wgpu::RequestAdapterError),
    /// An error in requesting the GPU (device).
    #[error("device error: {0}")]
    Device(wgpu::RequestDeviceError),
    /// The embedded shader did not pass validation.
    #[error("shader rejected: {0}")]
    Shader(ValidationError),
    /// Waiting for or mapping the result buffer failed.
    #[error("readback failed: {0}")]
    Readback(String),
    /// The call does not fit the device limits.
    #[error("{0}")]
    Limits(String),
    /// No device was acquired when the context was first built.
    #[error("no GPU context")]
    Unavailable,
}

impl GpuError {
    /// Converts into the crate error for a failed call to `symbol`.
    fn into_kernel_error(self, symbol: &str) -> KeplerError {
        match self {
            Self::Unavailable => KeplerError::Unavailable {
                platform: Platform::Gpu,
                reason: format!("`{symbol}` called without a GPU context"),
            },
            other => KeplerError::kernel(symbol, other.to_string()),
        }
    }
}

/// Holds the WGPU device, queue and the compiled Kepler pipeline.
///
/// Initialized once globally and reused for every call via `lazy_static`.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// A queue for information related to the device.
    pub queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl GpuContext {
    /// Selects the default adapter, creates a device and queue, and builds the
    /// Kepler pipeline.
    ///
    /// # Errors
    /// [`GpuError`] if adapter or device acquisition fails or the shader is
    /// rejected.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(GpuError::Adapter)?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("kepler_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        let shader = load_shader(&device, "kepler", KEPLER)?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kepler_bgl"),
            entries: &[
                layout_entry(0, wgpu::BufferBindingType::Uniform),
                layout_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                layout_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                layout_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
                layout_entry(4, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kepler_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("kepler_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        log::debug!("GPU context ready: {:?}", adapter.get_info().name);

        Ok(Self {
            device,
            queue,
            layout,
            pipeline,
        })
    }
}

fn layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Secure wrapper for WGSL source code.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 || !src.contains("fn main") {
            return Err(ValidationError);
        }

        // no source inclusion or escape hatches
        let forbidden = ["import", "#include", "asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// Validates WGSL source and compiles it on `device`.
///
/// # Errors
/// [`GpuError::Shader`] if the source fails the [`WgslSource`] checks.
pub fn load_shader(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, GpuError> {
    let source = TrustedData::new(WgslSource(source))
        .map_err(GpuError::Shader)?
        .into_inner()
        .0;

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    }))
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            log::warn!("GPU kernels disabled: {err}");
            None
        }
    };
}

/// Whether a GPU device was acquired and the pipeline built.
pub fn is_available() -> bool {
    GPU_CONTEXT.is_some()
}

/// Symbols exported by this module, for one-time registration.
#[must_use]
pub fn registrations() -> Vec<(&'static str, NativeKernel)> {
    vec![
        (GPU_KEPLER_F32, gpu_kepler_f32 as NativeKernel),
        (GPU_KEPLER_F64, gpu_kepler_f64 as NativeKernel),
    ]
}

/// float32 GPU kernel.
///
/// Inputs: `[M: f32[n], e: f32[n]]`; `opaque` is a packed [`KeplerDescriptor`]
/// holding `n`. Outputs: `[sin E: f32[n], cos E: f32[n]]`.
///
/// # Errors
/// [`KeplerError::Descriptor`] for a malformed payload, [`KeplerError::Kernel`]
/// for mismatched buffers or a device failure.
pub fn gpu_kepler_f32(
    inputs: &[Buffer],
    outputs: &mut [Buffer],
    opaque: &[u8],
) -> Result<(), KeplerError> {
    let symbol = GPU_KEPLER_F32;
    let n = KeplerDescriptor::unpack(opaque)?.count()?;
    let (mean_anomaly, eccentricity) = inputs_of::<f32>(symbol, inputs, n)?;
    let (sin_out, cos_out) = outputs_of::<f32>(symbol, outputs, n)?;

    let (sin_e, cos_e) = solve_on_device(mean_anomaly, eccentricity)
        .map_err(|err| err.into_kernel_error(symbol))?;

    sin_out
        .par_iter_mut()
        .zip(cos_out.par_iter_mut())
        .zip(sin_e.par_iter().zip(cos_e.par_iter()))
        .zip(mean_anomaly.par_iter().zip(eccentricity.par_iter()))
        .for_each(|(((s, c), (&sd, &cd)), (&m, &e))| {
            if in_domain(f64::from(m), f64::from(e)) {
                *s = sd;
                *c = cd;
            } else {
                *s = f32::NAN;
                *c = f32::NAN;
            }
        });

    Ok(())
}

/// float64 GPU kernel.
///
/// Same ABI as [`gpu_kepler_f32`] with `f64` buffers. The device solves in
/// single precision; the host refines to double.
///
/// # Errors
/// As [`gpu_kepler_f32`].
#[allow(clippy::cast_possible_truncation)]
pub fn gpu_kepler_f64(
    inputs: &[Buffer],
    outputs: &mut [Buffer],
    opaque: &[u8],
) -> Result<(), KeplerError> {
    let symbol = GPU_KEPLER_F64;
    let n = KeplerDescriptor::unpack(opaque)?.count()?;
    let (mean_anomaly, eccentricity) = inputs_of::<f64>(symbol, inputs, n)?;
    let (sin_out, cos_out) = outputs_of::<f64>(symbol, outputs, n)?;

    let m32: Vec<f32> = mean_anomaly.iter().map(|&x| x as f32).collect();
    let e32: Vec<f32> = eccentricity.iter().map(|&x| x as f32).collect();
    let (sin_e, cos_e) = solve_on_device(&m32, &e32)
        .map_err(|err| err.into_kernel_error(symbol))?;

    sin_out
        .par_iter_mut()
        .zip(cos_out.par_iter_mut())
        .zip(sin_e.par_iter().zip(cos_e.par_iter()))
        .zip(mean_anomaly.par_iter().zip(eccentricity.par_iter()))
        .for_each(|(((s, c), (&sd, &cd)), (&m, &e))| {
            (*s, *c) = refine(m, e, f64::from(sd), f64::from(cd));
        });

    Ok(())
}

fn in_domain(mean_anomaly: f64, eccentricity: f64) -> bool {
    mean_anomaly.is_finite() && (0.0..1.0).contains(&eccentricity)
}

fn inputs_of<'a, T: crate::dtype::Float>(
    symbol: &str,
    inputs: &'a [Buffer],
    n: usize,
) -> Result<(&'a [T], &'a [T]), KeplerError> {
    let [mean_anomaly, eccentricity] = inputs else {
        return Err(KeplerError::kernel(
            symbol,
            format!("expected 2 inputs, got {}", inputs.len()),
        ));
    };
    Ok((data(symbol, mean_anomaly, n)?, data(symbol, eccentricity, n)?))
}

fn outputs_of<'a, T: crate::dtype::Float>(
    symbol: &str,
    outputs: &'a mut [Buffer],
    n: usize,
) -> Result<(&'a mut [T], &'a mut [T]), KeplerError> {
    let outputs_len = outputs.len();
    let [sin_out, cos_out] = outputs else {
        return Err(KeplerError::kernel(
            symbol,
            format!("expected 2 outputs, got {outputs_len}"),
        ));
    };
    Ok((data_mut(symbol, sin_out, n)?, data_mut(symbol, cos_out, n)?))
}

fn solve_on_device(
    mean_anomaly: &[f32],
    eccentricity: &[f32],
) -> Result<(Vec<f32>, Vec<f32>), GpuError> {
    if mean_anomaly.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let ctx = GPU_CONTEXT
        .as_ref()
        .ok_or(GpuError::Unavailable)?;
    pollster::block_on(run_kepler_shader(ctx, mean_anomaly, eccentricity))
}

async fn run_kepler_shader(
    ctx: &GpuContext,
    mean_anomaly: &[f32],
    eccentricity: &[f32],
) -> Result<(Vec<f32>, Vec<f32>), GpuError> {
    let device = &ctx.device;
    let queue = &ctx.queue;

    let n = mean_anomaly.len();
    let count = u32::try_from(n)
        .map_err(|_| GpuError::Limits(format!("{n} elements exceed a single GPU dispatch")))?;
    let bytes = (n * size_of::<f32>()) as u64;
    let max_binding = u64::from(device.limits().max_storage_buffer_binding_size);
    if bytes > max_binding {
        return Err(GpuError::Limits(format!(
            "{bytes} byte buffers exceed the device binding limit of {max_binding}"
        )));
    }

    let groups = count.div_ceil(WORKGROUP_SIZE);
    let groups_x = groups.min(MAX_GROUPS_PER_DIM);
    let groups_y = groups.div_ceil(groups_x);

    let params = [count, groups_x, 0u32, 0u32];
    let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("params"),
        contents: bytemuck::cast_slice(&params),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let m_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("mean_anomaly"),
        contents: bytemuck::cast_slice(mean_anomaly),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let e_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("eccentricity"),
        contents: bytemuck::cast_slice(eccentricity),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let output = |label: &'static str| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    };
    let sin_buffer = output("sin_e");
    let cos_buffer = output("cos_e");

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("kepler_bind_group"),
        layout: &ctx.layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: m_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: e_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: sin_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: cos_buffer.as_entire_binding(),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("kepler_encoder"),
    });

    {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("kepler_pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&ctx.pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(groups_x, groups_y, 1);
    }

    // sin E in the first half, cos E in the second
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("staging"),
        size: 2 * bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    encoder.copy_buffer_to_buffer(&sin_buffer, 0, &staging, 0, bytes);
    encoder.copy_buffer_to_buffer(&cos_buffer, 0, &staging, bytes, bytes);

    queue.submit(Some(encoder.finish()));

    let (tx, rx) = std::sync::mpsc::channel();
    let slice = staging.slice(..);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| GpuError::Readback(err.to_string()))?;
    rx.recv()
        .map_err(|err| GpuError::Readback(err.to_string()))?
        .map_err(|err| GpuError::Readback(err.to_string()))?;

    let view = slice.get_mapped_range();
    let values = bytemuck::try_cast_slice::<u8, f32>(&view)
        .map(<[f32]>::to_vec)
        .map_err(|err| GpuError::Readback(err.to_string()));
    drop(view);
    staging.unmap();

    let mut sin_e = values?;
    let cos_e = sin_e.split_off(n);
    Ok((sin_e, cos_e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_shader_passes_validation() {
        assert!(WgslSource(KEPLER).validate().is_ok());
        assert!(WgslSource("fn main() { let p: ptr<function, f32>; }").validate().is_err());
        assert!(WgslSource("fn helper() {}").validate().is_err());
    }

    #[test]
    fn missing_context_is_unavailable() {
        assert!(matches!(
            GpuError::Unavailable.into_kernel_error(GPU_KEPLER_F64),
            KeplerError::Unavailable {
                platform: Platform::Gpu,
                ..
            }
        ));
        assert!(matches!(
            GpuError::Limits("too big".to_string()).into_kernel_error(GPU_KEPLER_F64),
            KeplerError::Kernel { .. }
        ));

        if !is_available() {
            let m = [0.5f32];
            assert!(matches!(solve_on_device(&m, &m), Err(GpuError::Unavailable)));
        }
    }

    #[test]
    fn kernel_matches_cpu_when_device_present() {
        if !is_available() {
            return;
        }
        let m = vec![0.0f32, 1.0, 2.0, 3.0, 4.0];
        let e = vec![0.5f32, 0.1, 0.9, 0.0, 1.5];
        let inputs = [Buffer::F32(m.clone()), Buffer::F32(e.clone())];
        let mut outputs = [Buffer::F32(vec![0.0; 5]), Buffer::F32(vec![0.0; 5])];
        gpu_kepler_f32(&inputs, &mut outputs, &KeplerDescriptor::new(5).pack()).unwrap();

        let Buffer::F32(s) = &outputs[0] else { panic!() };
        for i in 0..4 {
            let (expected, _) = crate::ops::cpu::solve(f64::from(m[i]), f64::from(e[i]));
            assert!((f64::from(s[i]) - expected).abs() < 1e-4);
        }
        assert!(s[4].is_nan());
    }
}
