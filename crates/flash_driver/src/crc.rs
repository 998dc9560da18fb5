//! CRC-32/ISO-HDLC, the checksum used by the metadata record and image checks.
//! Records written by earlier firmware depend on this exact variant.

use ::crc::{CRC_32_ISO_HDLC, Crc, Digest};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

/// Incremental form of [`crc32`] for data read from flash in chunks.
pub struct Crc32Digest {
    digest: Digest<'static, u32>,
}

impl Crc32Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Crc32Digest {
    fn default() -> Self {
        Self::new()
    }
}
