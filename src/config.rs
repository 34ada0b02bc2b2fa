//! Process configuration.
//!
//! Two knobs exist: the default platform of the eager path (stored in
//! [`crate::backend`]) and the x64 switch deciding whether float64 is a
//! first-class dtype or canonicalizes to float32. Both can be set from the
//! environment:
//!
//! | Variable            | Values                                  | Default |
//! |---------------------|-----------------------------------------|---------|
//! | `KEPLER_PLATFORM`   | `cpu`, `gpu`                            | `cpu`   |
//! | `KEPLER_ENABLE_X64` | `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` | `1` |

use core::sync::atomic::{AtomicBool, Ordering};

use crate::backend::{Platform, default_platform, set_default_platform};
use crate::error::KeplerError;

/// Environment variable selecting the default platform.
pub const PLATFORM_ENV: &str = "KEPLER_PLATFORM";

/// Environment variable toggling float64 support.
pub const ENABLE_X64_ENV: &str = "KEPLER_ENABLE_X64";

static ENABLE_X64: AtomicBool = AtomicBool::new(true);

/// Whether float64 is kept as-is (`true`) or canonicalized to float32.
pub fn enable_x64() -> bool {
    ENABLE_X64.load(Ordering::Acquire)
}

/// Sets the x64 switch.
pub fn set_enable_x64(enabled: bool) {
    ENABLE_X64.store(enabled, Ordering::Release);
}

/// Snapshot of the process configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Platform used by the eager path.
    pub platform: Platform,
    /// See [`enable_x64`].
    pub enable_x64: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: Platform::Cpu,
            enable_x64: true,
        }
    }
}

impl Config {
    /// Reads the configuration through an arbitrary key lookup, starting from
    /// the defaults.
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if a value is not recognized.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, KeplerError> {
        Self::default().overlay(lookup)
    }

    /// Overrides the fields whose variables `lookup` knows; the rest are kept.
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] if a value is not recognized.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, KeplerError> {
        if let Some(platform) = lookup(PLATFORM_ENV) {
            self.platform = platform.parse()?;
        }
        if let Some(flag) = lookup(ENABLE_X64_ENV) {
            self.enable_x64 = parse_flag(ENABLE_X64_ENV, &flag)?;
        }
        Ok(self)
    }

    /// Installs this configuration process-wide.
    pub fn apply(&self) {
        log::debug!(
            "applying config: platform={}, enable_x64={}",
            self.platform,
            self.enable_x64
        );
        set_default_platform(self.platform);
        set_enable_x64(self.enable_x64);
    }
}

/// The configuration currently in effect.
pub fn current() -> Config {
    Config {
        platform: default_platform(),
        enable_x64: enable_x64(),
    }
}

/// Applies whichever configuration variables are set in the environment.
///
/// Unset variables leave the current setting untouched. If any variable is
/// invalid the whole environment is ignored.
pub(crate) fn apply_env() {
    let lookup = |key: &str| std::env::var(key).ok();
    if [PLATFORM_ENV, ENABLE_X64_ENV].iter().all(|key| lookup(key).is_none()) {
        return;
    }
    match current().overlay(lookup) {
        Ok(config) => config.apply(),
        Err(err) => log::warn!("ignoring environment configuration: {err}"),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, KeplerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(KeplerError::InvalidArgument(format!(
            "{key} must be a boolean flag, got `{other}`"
        ))),
    }
}
