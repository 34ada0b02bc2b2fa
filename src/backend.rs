//! Backend selection module.
//!
//! This module defines the platforms the Kepler primitive can be lowered for
//! and provides functions to set and get the process-wide default platform.
//!
//! # Supported Platforms
//!
//! - `Cpu` — native CPU kernels (default, always registered).
//! - `Gpu` — native GPU kernels, present only when the crate is built with the
//!   `wgpu` feature and a device could be acquired.
//!
//! The default platform is stored globally using an `AtomicU8`, so the eager
//! path can read it on every call without locking.

use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::error::KeplerError;

/// Enumeration of the platforms the primitive can be dispatched to.
///
/// Each variant binds one statically-known calling convention; see
/// [`crate::ops::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Platform {
    /// Host CPU; element count passed as a leading scalar operand.
    #[default]
    Cpu = 0,
    /// GPU; element count passed in the opaque descriptor.
    Gpu = 1,
}

impl Platform {
    /// Every platform, in tag order.
    pub const ALL: [Self; 2] = [Self::Cpu, Self::Gpu];

    /// Lower-case tag used as the native symbol prefix.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl TryFrom<u8> for Platform {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Gpu),
            _ => Err(()),
        }
    }
}

impl FromStr for Platform {
    type Err = KeplerError;

    /// Parses a backend tag, case-insensitively.
    ///
    /// # Errors
    /// [`KeplerError::InvalidArgument`] naming the allowed set for any other tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(KeplerError::InvalidArgument(format!(
                "unsupported platform `{other}`; this must be either 'cpu' or 'gpu'"
            ))),
        }
    }
}

/// Internal global state for the default platform.
static GLOBAL_DEFAULT_PLATFORM: AtomicU8 = AtomicU8::new(Platform::Cpu as u8);

/// Sets the platform used by the eager path.
///
/// # Example
/// ```
/// use kepler_op::backend::{default_platform, set_default_platform, Platform};
/// set_default_platform(Platform::Cpu);
/// assert_eq!(default_platform(), Platform::Cpu);
/// ```
pub fn set_default_platform(p: Platform) {
    GLOBAL_DEFAULT_PLATFORM.store(p as u8, Ordering::Release);
}

/// Returns the platform used by the eager path.
///
/// If the stored value is invalid, defaults to [`Platform::Cpu`].
pub fn default_platform() -> Platform {
    Platform::try_from(GLOBAL_DEFAULT_PLATFORM.load(Ordering::Acquire)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tags() {
        assert_eq!("cpu".parse::<Platform>().unwrap(), Platform::Cpu);
        assert_eq!(" GPU ".parse::<Platform>().unwrap(), Platform::Gpu);
    }

    #[test]
    fn unknown_tag_names_allowed_set() {
        let err = "tpu".parse::<Platform>().unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, KeplerError::InvalidArgument(_)));
        assert!(msg.contains("'cpu'") && msg.contains("'gpu'"), "{msg}");
    }

    #[test]
    fn raw_round_trip() {
        for p in Platform::ALL {
            assert_eq!(Platform::try_from(p as u8), Ok(p));
        }
        assert!(Platform::try_from(7).is_err());
    }
}
