//! Length-prefixed blobs: a big-endian `u32` length followed by the payload.
//! An erased length field (all ones) means nothing is stored.

use heapless::Vec;

use crate::bus::QspiBus;
use crate::driver::FlashDriver;
use crate::error::FlashError;

const LEN_PREFIX: u32 = 4;
const ABSENT: u32 = u32::MAX;

impl<B: QspiBus> FlashDriver<B> {
    /// Erase the sectors under prefix and payload, then program both.
    pub fn write_string(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.ensure_command_mode()?;
        let len = u32::try_from(data.len()).map_err(|_| FlashError::InvalidLength)?;
        if len == ABSENT {
            return Err(FlashError::InvalidLength);
        }
        let payload_addr = addr.checked_add(LEN_PREFIX).ok_or(FlashError::InvalidAddress)?;
        let total = data
            .len()
            .checked_add(LEN_PREFIX as usize)
            .ok_or(FlashError::InvalidLength)?;
        self.erase_touched_sectors(addr, total)?;
        self.program_buffer(addr, &len.to_be_bytes())?;
        self.program_buffer(payload_addr, data)
    }

    /// Read a blob into `buf`, returning its length.
    pub fn read_string(&mut self, addr: u32, buf: &mut [u8]) -> Result<usize, FlashError> {
        let len = self.read_string_len(addr)?;
        let payload = buf.get_mut(..len).ok_or(FlashError::InvalidLength)?;
        self.read_buffer(addr.saturating_add(LEN_PREFIX), payload)?;
        Ok(len)
    }

    pub fn read_string_vec<const N: usize>(&mut self, addr: u32) -> Result<Vec<u8, N>, FlashError> {
        let len = self.read_string_len(addr)?;
        let mut out = Vec::new();
        out.resize(len, 0).map_err(|_| FlashError::InvalidLength)?;
        self.read_buffer(addr.saturating_add(LEN_PREFIX), &mut out)?;
        Ok(out)
    }

    fn read_string_len(&mut self, addr: u32) -> Result<usize, FlashError> {
        let mut prefix = [0u8; LEN_PREFIX as usize];
        self.read_buffer(addr, &mut prefix)?;
        let len = u32::from_be_bytes(prefix);
        if len == ABSENT {
            return Err(FlashError::NotFound);
        }
        let payload_addr = addr.checked_add(LEN_PREFIX).ok_or(FlashError::InvalidAddress)?;
        let len = usize::try_from(len).map_err(|_| FlashError::InvalidLength)?;
        self.check_range(payload_addr, len)
            .map_err(|_| FlashError::InvalidLength)?;
        Ok(len)
    }
}
