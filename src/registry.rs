//! Native symbol registry.
//!
//! Maps native symbol names (`cpu_kepler_f32`, `gpu_kepler_f64`, ...) to the
//! kernel function and the platform it runs on. The table is filled once by
//! [`initialize`] and read on every execution afterwards.
//!
//! Registering a symbol again with the same function and platform is a no-op;
//! registering it with anything else is a [`KeplerError::ConflictingRegistration`].

use std::collections::HashMap;
use std::sync::{Once, OnceLock, PoisonError, RwLock};

use crate::backend::Platform;
use crate::error::KeplerError;
use crate::ops::{NativeKernel, cpu};

struct TargetEntry {
    platform: Platform,
    kernel: NativeKernel,
}

/// Global registry of native call targets
static TARGETS: OnceLock<RwLock<HashMap<String, TargetEntry>>> = OnceLock::new();

static INIT: Once = Once::new();

fn targets() -> &'static RwLock<HashMap<String, TargetEntry>> {
    TARGETS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers `kernel` under `name` for `platform`.
///
/// # Errors
/// [`KeplerError::ConflictingRegistration`] if `name` is already bound to a
/// different function or platform.
pub fn register_custom_call_target(
    name: &str,
    kernel: NativeKernel,
    platform: Platform,
) -> Result<(), KeplerError> {
    // entries are inserted whole, so a poisoned table is still consistent
    let mut targets = targets().write().unwrap_or_else(PoisonError::into_inner);

    if let Some(existing) = targets.get(name) {
        if existing.platform == platform && core::ptr::fn_addr_eq(existing.kernel, kernel) {
            return Ok(());
        }
        return Err(KeplerError::ConflictingRegistration {
            symbol: name.to_string(),
            platform: existing.platform,
        });
    }

    log::debug!("registered native target {name} for {platform}");
    targets.insert(name.to_string(), TargetEntry { platform, kernel });
    Ok(())
}

/// Registers the built-in kernels. Runs once per process; later calls return
/// immediately.
///
/// CPU kernels are always registered. GPU kernels are registered only when the
/// crate is built with the `wgpu` feature and a device could be acquired.
pub fn initialize() {
    INIT.call_once(|| {
        register_all(Platform::Cpu, cpu::registrations());

        #[cfg(feature = "wgpu")]
        if crate::ops::wgpu::is_available() {
            register_all(Platform::Gpu, crate::ops::wgpu::registrations());
        }
    });
}

fn register_all(platform: Platform, kernels: Vec<(&'static str, NativeKernel)>) {
    for (name, kernel) in kernels {
        if let Err(err) = register_custom_call_target(name, kernel, platform) {
            log::warn!("skipping built-in target: {err}");
        }
    }
}

/// Finds the kernel registered under `name` for `platform`.
pub fn lookup(name: &str, platform: Platform) -> Option<NativeKernel> {
    initialize();
    let targets = targets().read().unwrap_or_else(PoisonError::into_inner);
    targets
        .get(name)
        .filter(|entry| entry.platform == platform)
        .map(|entry| entry.kernel)
}

/// Whether any kernel is registered for `platform`.
pub fn platform_available(platform: Platform) -> bool {
    initialize();
    let targets = targets().read().unwrap_or_else(PoisonError::into_inner);
    targets.values().any(|entry| entry.platform == platform)
}

/// Every registered symbol with its platform, sorted by name.
pub fn registered_targets() -> Vec<(String, Platform)> {
    initialize();
    let targets = targets().read().unwrap_or_else(PoisonError::into_inner);
    let mut out: Vec<_> = targets
        .iter()
        .map(|(name, entry)| (name.clone(), entry.platform))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Buffer;

    fn noop(_: &[Buffer], _: &mut [Buffer], _: &[u8]) -> Result<(), KeplerError> {
        Ok(())
    }

    #[test]
    fn builtin_cpu_targets_present() {
        assert!(lookup("cpu_kepler_f32", Platform::Cpu).is_some());
        assert!(lookup("cpu_kepler_f64", Platform::Cpu).is_some());
        assert!(lookup("cpu_kepler_f64", Platform::Gpu).is_none());
        assert!(platform_available(Platform::Cpu));
    }

    #[test]
    fn reregistering_same_target_is_idempotent() {
        register_custom_call_target("registry_test_same", noop, Platform::Cpu).unwrap();
        register_custom_call_target("registry_test_same", noop, Platform::Cpu).unwrap();
    }

    #[test]
    fn conflicting_target_is_rejected() {
        initialize();
        assert_eq!(
            register_custom_call_target("cpu_kepler_f32", noop, Platform::Cpu),
            Err(KeplerError::ConflictingRegistration {
                symbol: "cpu_kepler_f32".to_string(),
                platform: Platform::Cpu
            })
        );
        assert!(
            register_custom_call_target("cpu_kepler_f64", cpu::cpu_kepler_f64, Platform::Gpu)
                .is_err()
        );
    }
}
