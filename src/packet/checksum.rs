use std::fmt::{Debug, Formatter};

use crc::{Crc, CRC_32_ISO_HDLC};

/// The standard (IEEE 802.3 / zlib) CRC32
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Integrity value of a packet, covering `length ∥ command ∥ payload`. It is little-endian on
///  the wire.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Checksum(pub u32);
impl Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x?}", self.0)
    }
}
impl Checksum {
    pub const SERIALIZED_LEN: usize = std::mem::size_of::<u32>();

    pub fn new(length: u8, command: u8, payload: &[u8]) -> Checksum {
        let mut digest = CRC32.digest();

        digest.update(&[length, command]);
        digest.update(payload);

        Checksum(
            digest.finalize()
        )
    }

    /// checksum over an arbitrary byte sequence
    #[cfg(test)]
    pub fn of(data: &[u8]) -> Checksum {
        Checksum(CRC32.checksum(data))
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}
