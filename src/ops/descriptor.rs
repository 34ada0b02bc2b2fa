//! Opaque GPU call payload.
//!
//! GPU kernels cannot receive scalar operands, so the element count travels
//! in the call's opaque byte string instead: a single signed 64-bit integer,
//! little-endian, 8 bytes long with no padding or header.

use briny::prelude::*;

use crate::error::KeplerError;

/// Wire size of a packed descriptor.
pub const DESCRIPTOR_LEN: usize = 8;

/// Per-call parameters for the GPU kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeplerDescriptor {
    /// Number of elements in each operand.
    pub size: i64,
}

impl Validate for KeplerDescriptor {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.size < 0 {
            return Err(ValidationError);
        }
        Ok(())
    }
}

impl KeplerDescriptor {
    /// Creates a descriptor for `size` elements.
    #[must_use]
    pub const fn new(size: i64) -> Self {
        Self { size }
    }

    /// Serializes to the 8-byte wire form.
    #[must_use]
    pub fn pack(&self) -> Vec<u8> {
        self.size.to_le_bytes().to_vec()
    }

    /// Parses the wire form.
    ///
    /// # Errors
    /// [`KeplerError::Descriptor`] if the payload is not exactly 8 bytes or
    /// holds a negative count.
    pub fn unpack(opaque: &[u8]) -> Result<Self, KeplerError> {
        let bytes: [u8; DESCRIPTOR_LEN] = opaque.try_into().map_err(|_| {
            KeplerError::Descriptor(format!(
                "expected {DESCRIPTOR_LEN} bytes, got {}",
                opaque.len()
            ))
        })?;

        let raw = Self::new(i64::from_le_bytes(bytes));
        let trusted = TrustedData::new(raw).map_err(|_| {
            KeplerError::Descriptor(format!("negative element count {}", raw.size))
        })?;
        Ok(trusted.into_inner())
    }

    /// The element count as a host index.
    ///
    /// # Errors
    /// [`KeplerError::Descriptor`] if the count does not fit `usize`.
    pub fn count(&self) -> Result<usize, KeplerError> {
        usize::try_from(self.size)
            .map_err(|_| KeplerError::Descriptor(format!("count {} exceeds usize", self.size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_little_endian() {
        assert_eq!(
            KeplerDescriptor::new(5555).pack(),
            vec![0xB3, 0x15, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(KeplerDescriptor::new(0).pack(), vec![0; 8]);
    }

    #[test]
    fn unpack_reads_what_pack_wrote() {
        let d = KeplerDescriptor::new(1 << 40);
        assert_eq!(KeplerDescriptor::unpack(&d.pack()).unwrap(), d);
    }

    #[test]
    fn unpack_rejects_bad_lengths_and_negative_counts() {
        assert!(matches!(
            KeplerDescriptor::unpack(&[1, 2, 3]),
            Err(KeplerError::Descriptor(_))
        ));
        assert!(matches!(
            KeplerDescriptor::unpack(&(-1i64).to_le_bytes()),
            Err(KeplerError::Descriptor(_))
        ));
    }
}
