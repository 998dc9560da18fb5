//! Command-mode driver for a serial NOR flash behind a QSPI controller.
//!
//! Every erase and program follows the same sequence:
//! 1) Set the write enable latch and poll status register 1 until WEL reads back.
//! 2) Issue the erase/program instruction.
//! 3) Poll BUSY with a bounded number of reads, sized from the part's
//!    worst-case time for that operation.
//!
//! Erase and program are refused while the controller is memory mapped; the
//! caller must leave mapped mode first (see [`FlashDriver::command_mode`]).
//! Reads work in both modes.

use crate::bus::QspiBus;
use crate::command::{self, Command};
use crate::erase::{EraseGranularity, ErasePlan};
use crate::error::FlashError;
use crate::part::{FlashPart, PAGE_SIZE, SECTOR_SIZE};

/// Status polls allowed for the write enable latch to read back.
const WRITE_ENABLE_POLLS: u32 = 100;
/// tRST: time the device needs after a software reset.
const RESET_RECOVERY_US: u32 = 30;

pub struct FlashDriver<B: QspiBus> {
    bus: B,
    part: FlashPart,
    mapped: bool,
    initialized: bool,
}

impl<B: QspiBus> FlashDriver<B> {
    /// The controller is assumed to be in command mode until `init` says
    /// otherwise.
    pub const fn new(bus: B, part: FlashPart) -> Self {
        Self {
            bus,
            part,
            mapped: false,
            initialized: false,
        }
    }

    pub fn part(&self) -> &FlashPart {
        &self.part
    }

    pub fn capacity(&self) -> u32 {
        self.part.capacity
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn release(self) -> B {
        self.bus
    }

    /// Reset the device, check its identity and turn on quad I/O.
    pub fn init(&mut self) -> Result<(), FlashError> {
        self.initialized = false;
        self.bus.set_memory_mapped(false).map_err(map_bus_error)?;
        self.mapped = false;

        self.bus
            .command(&Command::new(command::RESET_ENABLE))
            .map_err(map_bus_error)?;
        self.bus
            .command(&Command::new(command::RESET_DEVICE))
            .map_err(map_bus_error)?;
        self.bus.delay_us(RESET_RECOVERY_US);

        let id = self.read_jedec_id()?;
        if id != self.part.jedec_id {
            error!(
                "flash: id {:#x} does not match {:#x}",
                id, self.part.jedec_id
            );
            return Err(FlashError::DeviceMismatch);
        }

        self.enable_quad()?;
        self.initialized = true;
        info!("flash: {} ready, {} bytes", self.part.name, self.part.capacity);
        Ok(())
    }

    pub fn read_jedec_id(&mut self) -> Result<u32, FlashError> {
        let mut id = [0u8; 3];
        self.bus
            .command_read(&Command::new(command::READ_JEDEC_ID), &mut id)
            .map_err(map_bus_error)?;
        let [manufacturer, memory_type, capacity] = id;
        Ok(u32::from_be_bytes([0, manufacturer, memory_type, capacity]))
    }

    pub fn enter_mapped_mode(&mut self) -> Result<(), FlashError> {
        self.ensure_initialized()?;
        if self.mapped {
            return Ok(());
        }
        self.bus.set_memory_mapped(true).map_err(map_bus_error)?;
        self.mapped = true;
        trace!("flash: mapped");
        Ok(())
    }

    pub fn exit_mapped_mode(&mut self) -> Result<(), FlashError> {
        self.ensure_initialized()?;
        if !self.mapped {
            return Ok(());
        }
        self.bus.set_memory_mapped(false).map_err(map_bus_error)?;
        self.mapped = false;
        trace!("flash: command mode");
        Ok(())
    }

    pub fn sector_erase(&mut self, addr: u32) -> Result<(), FlashError> {
        self.erase_unit(EraseGranularity::Sector, addr)
    }

    pub fn block_erase_32k(&mut self, addr: u32) -> Result<(), FlashError> {
        self.erase_unit(EraseGranularity::Block32K, addr)
    }

    pub fn block_erase_64k(&mut self, addr: u32) -> Result<(), FlashError> {
        self.erase_unit(EraseGranularity::Block64K, addr)
    }

    pub fn chip_erase(&mut self) -> Result<(), FlashError> {
        self.ensure_command_mode()?;
        info!("flash: chip erase");
        self.write_enable()?;
        self.bus
            .command(&Command::new(command::CHIP_ERASE))
            .map_err(map_bus_error)?;
        self.wait_idle(self.part.timeouts.chip_erase_us)
    }

    /// Erase exactly `[addr, addr + len)` with the fewest erase commands.
    /// `addr` must be sector aligned and `len` a multiple of the sector size.
    pub fn buffer_erase(&mut self, addr: u32, len: u32) -> Result<(), FlashError> {
        self.ensure_command_mode()?;
        self.check_range(addr, len as usize)?;
        debug!("flash: erase {:#x}+{:#x}", addr, len);
        for step in ErasePlan::new(addr, len)? {
            let step = step?;
            self.erase_unit(step.granularity, step.addr)?;
        }
        Ok(())
    }

    /// Program up to one page. The data must not cross a page boundary.
    pub fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.ensure_command_mode()?;
        let len = u32::try_from(data.len()).map_err(|_| FlashError::InvalidLength)?;
        if len > PAGE_SIZE {
            return Err(FlashError::InvalidLength);
        }
        if len == 0 {
            return Ok(());
        }
        let page_offset = addr % PAGE_SIZE;
        if page_offset.checked_add(len).ok_or(FlashError::InvalidLength)? > PAGE_SIZE {
            return Err(FlashError::InvalidLength);
        }
        self.check_range(addr, data.len())?;

        self.write_enable()?;
        let cmd = Command::with_address(command::QUAD_PAGE_PROGRAM, addr).quad_data();
        self.bus.command_write(&cmd, data).map_err(map_bus_error)?;
        self.wait_idle(self.part.timeouts.page_program_us)
    }

    /// Program `data` at `addr` page by page, without erasing. The target must
    /// already be erased.
    pub fn program_buffer(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.ensure_command_mode()?;
        self.check_range(addr, data.len())?;

        let mut addr = addr;
        let mut rest = data;
        while !rest.is_empty() {
            let page_room = PAGE_SIZE
                .checked_sub(addr % PAGE_SIZE)
                .ok_or(FlashError::InvalidAddress)?;
            let chunk_len = rest.len().min(page_room as usize);
            let (chunk, tail) = rest.split_at_checked(chunk_len).ok_or(FlashError::InvalidLength)?;
            self.write_page(addr, chunk)?;
            addr = addr
                .checked_add(chunk_len as u32)
                .ok_or(FlashError::InvalidAddress)?;
            rest = tail;
        }
        Ok(())
    }

    /// Write `data` at any address. Every sector the range touches is erased
    /// first, all of them before the first page is programmed; bytes of those
    /// sectors outside the range are lost.
    pub fn write_buffer(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.ensure_command_mode()?;
        if data.is_empty() {
            return Ok(());
        }
        self.erase_touched_sectors(addr, data.len())?;
        self.program_buffer(addr, data)
    }

    pub fn read_buffer(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.ensure_initialized()?;
        self.check_range(addr, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        if self.mapped {
            return self.bus.read_mapped(addr, buf).map_err(map_bus_error);
        }
        let cmd = Command::with_address(command::FAST_READ_QUAD_IO, addr)
            .quad_address()
            .quad_data()
            .dummy(command::QUAD_READ_DUMMY_CYCLES);
        self.bus.command_read(&cmd, buf).map_err(map_bus_error)
    }

    pub(crate) fn erase_touched_sectors(&mut self, addr: u32, len: usize) -> Result<(), FlashError> {
        let end = self.check_range(addr, len)?;
        let first = addr
            .checked_sub(addr % SECTOR_SIZE)
            .ok_or(FlashError::InvalidAddress)?;
        let last = align_up(end, SECTOR_SIZE)?;
        let span = last.checked_sub(first).ok_or(FlashError::InvalidAddress)?;
        self.buffer_erase(first, span)
    }

    /// Check `[addr, addr + len)` lies inside the device; returns the end.
    pub(crate) fn check_range(&self, addr: u32, len: usize) -> Result<u32, FlashError> {
        let len = u32::try_from(len).map_err(|_| FlashError::InvalidLength)?;
        let end = addr.checked_add(len).ok_or(FlashError::InvalidAddress)?;
        if end > self.part.capacity {
            return Err(FlashError::InvalidAddress);
        }
        Ok(end)
    }

    pub(crate) fn ensure_initialized(&self) -> Result<(), FlashError> {
        if !self.initialized {
            return Err(FlashError::NotInitialized);
        }
        Ok(())
    }

    pub(crate) fn ensure_command_mode(&self) -> Result<(), FlashError> {
        self.ensure_initialized()?;
        if self.mapped {
            return Err(FlashError::MappedMode);
        }
        Ok(())
    }

    fn erase_unit(&mut self, granularity: EraseGranularity, addr: u32) -> Result<(), FlashError> {
        self.ensure_command_mode()?;
        if addr % granularity.size() != 0 {
            return Err(FlashError::InvalidAddress);
        }
        self.check_range(addr, granularity.size() as usize)?;

        self.write_enable()?;
        self.bus
            .command(&Command::with_address(granularity.opcode(), addr))
            .map_err(map_bus_error)?;
        let timeouts = self.part.timeouts;
        let timeout_us = match granularity {
            EraseGranularity::Sector => timeouts.sector_erase_us,
            EraseGranularity::Block32K => timeouts.block_32k_erase_us,
            EraseGranularity::Block64K => timeouts.block_64k_erase_us,
        };
        self.wait_idle(timeout_us)
    }

    fn enable_quad(&mut self) -> Result<(), FlashError> {
        let status2 = self.read_status(command::READ_STATUS_2)?;
        if status2 & command::STATUS_QE != 0 {
            return Ok(());
        }
        debug!("flash: setting QE");
        self.write_enable()?;
        self.bus
            .command_write(
                &Command::new(command::WRITE_STATUS_2),
                &[status2 | command::STATUS_QE],
            )
            .map_err(map_bus_error)?;
        self.wait_idle(self.part.timeouts.status_write_us)?;
        if self.read_status(command::READ_STATUS_2)? & command::STATUS_QE == 0 {
            return Err(FlashError::TransmitFailed);
        }
        Ok(())
    }

    fn write_enable(&mut self) -> Result<(), FlashError> {
        self.bus
            .command(&Command::new(command::WRITE_ENABLE))
            .map_err(map_bus_error)?;
        for _ in 0..WRITE_ENABLE_POLLS {
            if self.read_status(command::READ_STATUS_1)? & command::STATUS_WEL != 0 {
                return Ok(());
            }
            self.bus.delay_us(self.part.timeouts.poll_interval_us);
        }
        warn!("flash: write enable latch never set");
        Err(FlashError::WriteEnableFailed)
    }

    fn wait_idle(&mut self, timeout_us: u32) -> Result<(), FlashError> {
        let polls = self.part.timeouts.polls(timeout_us);
        for _ in 0..polls {
            if self.read_status(command::READ_STATUS_1)? & command::STATUS_BUSY == 0 {
                return Ok(());
            }
            self.bus.delay_us(self.part.timeouts.poll_interval_us);
        }
        warn!("flash: busy after {} us", timeout_us);
        Err(FlashError::Timeout)
    }

    fn read_status(&mut self, opcode: u8) -> Result<u8, FlashError> {
        let mut status = [0u8; 1];
        self.bus
            .command_read(&Command::new(opcode), &mut status)
            .map_err(map_bus_error)?;
        let [status] = status;
        Ok(status)
    }
}

fn align_up(value: u32, align: u32) -> Result<u32, FlashError> {
    let mask = align.checked_sub(1).ok_or(FlashError::InvalidAddress)?;
    let value = value.checked_add(mask).ok_or(FlashError::InvalidAddress)?;
    Ok(value & !mask)
}

fn map_bus_error<E: core::fmt::Debug>(_error: E) -> FlashError {
    FlashError::TransmitFailed
}
