//! Adapters for filesystem glue and other generic storage users.
//!
//! Unlike the raw driver calls, these bracket erase and program with
//! [`FlashDriver::command_mode`], so callers may hold the bus in mapped mode.

use embedded_storage::nor_flash::{
    ErrorType, MultiwriteNorFlash, NorFlash, ReadNorFlash, check_erase, check_read, check_write,
};

use crate::bus::QspiBus;
use crate::driver::FlashDriver;
use crate::error::FlashError;
use crate::part::{BLOCK_64K_SIZE, SECTOR_SIZE};

pub trait BlockDevice {
    type Error;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;
    /// Erase-before-write: the sectors the range touches are erased first.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;
    fn erase(&mut self, addr: u32, len: u32) -> Result<(), Self::Error>;
    fn sector_size(&self) -> u32;
    fn block_size(&self) -> u32;
    fn sector_count(&self) -> u32;
}

impl<B: QspiBus> BlockDevice for FlashDriver<B> {
    type Error = FlashError;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.read_buffer(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let mut flash = self.command_mode()?;
        flash.write_buffer(addr, data)?;
        flash.finish()
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<(), FlashError> {
        let mut flash = self.command_mode()?;
        flash.buffer_erase(addr, len)?;
        flash.finish()
    }

    fn sector_size(&self) -> u32 {
        SECTOR_SIZE
    }

    fn block_size(&self) -> u32 {
        BLOCK_64K_SIZE
    }

    fn sector_count(&self) -> u32 {
        self.part().sector_count()
    }
}

impl<B: QspiBus> ErrorType for FlashDriver<B> {
    type Error = FlashError;
}

impl<B: QspiBus> ReadNorFlash for FlashDriver<B> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        self.read_buffer(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.part().capacity as usize
    }
}

impl<B: QspiBus> NorFlash for FlashDriver<B> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SECTOR_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        let len = to.checked_sub(from).ok_or(FlashError::InvalidLength)?;
        let mut flash = self.command_mode()?;
        flash.buffer_erase(from, len)?;
        flash.finish()
    }

    /// Programs without erasing, as the `NorFlash` contract requires.
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        let mut flash = self.command_mode()?;
        flash.program_buffer(offset, bytes)?;
        flash.finish()
    }
}

// Programming only ever clears bits, so repeated writes to a word are fine.
impl<B: QspiBus> MultiwriteNorFlash for FlashDriver<B> {}
