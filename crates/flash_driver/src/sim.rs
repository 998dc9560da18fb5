//! In-memory NOR device speaking the same command set as the real part.
//!
//! Programming only clears bits, erase sets whole units back to `0xFF`,
//! erase/program/status writes are ignored unless the write enable latch is
//! set, and any command issued while memory mapped is an error. Every
//! transaction except status polling is recorded so tests can assert on the
//! exact bus traffic.
#![allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::vec;
use std::vec::Vec;

use crate::bus::QspiBus;
use crate::command::{self, Command};
use crate::part::{BLOCK_32K_SIZE, BLOCK_64K_SIZE, FlashPart, PAGE_SIZE, SECTOR_SIZE};

/// Status reads that report BUSY after each erase or program.
const BUSY_POLLS: u32 = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SimError {
    /// A command was issued while the bus was memory mapped.
    Mapped,
    /// A mapped read was issued in command mode.
    NotMapped,
    OutOfRange,
    Injected,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SimOp {
    Reset,
    ReadId,
    WriteEnable,
    WriteStatus2(u8),
    Erase { opcode: u8, addr: u32 },
    ChipErase,
    Program { addr: u32, len: usize },
    Read { addr: u32, len: usize },
    MappedRead { addr: u32, len: usize },
    EnterMapped,
    ExitMapped,
}

/// Faults the device or controller can be told to exhibit.
#[derive(Debug, Default, Copy, Clone)]
pub struct Faults {
    /// WRITE_ENABLE is accepted but the latch never sets.
    pub ignore_write_enable: bool,
    /// BUSY never clears.
    pub stuck_busy: bool,
    /// Erase instructions fail in the controller.
    pub fail_erase: bool,
    /// Program instructions fail in the controller.
    pub fail_program: bool,
    /// The controller refuses to switch into memory-mapped mode.
    pub fail_map: bool,
}

pub struct SimFlashBus {
    memory: Vec<u8>,
    jedec_id: u32,
    write_enabled: bool,
    status2: u8,
    busy_polls: u32,
    mapped: bool,
    ops: Vec<SimOp>,
    delayed_us: u64,
    pub faults: Faults,
}

impl SimFlashBus {
    /// A blank (all `0xFF`) device matching `part`, quad mode still disabled.
    pub fn new(part: &FlashPart) -> Self {
        Self {
            memory: vec![0xFF; part.capacity as usize],
            jedec_id: part.jedec_id,
            write_enabled: false,
            status2: 0,
            busy_polls: 0,
            mapped: false,
            ops: Vec::new(),
            delayed_us: 0,
            faults: Faults::default(),
        }
    }

    pub fn with_jedec_id(mut self, jedec_id: u32) -> Self {
        self.jedec_id = jedec_id;
        self
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Direct access for planting images or corrupting bytes.
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    pub fn ops(&self) -> &[SimOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// `(opcode, addr)` of every erase issued, chip erase excluded.
    pub fn erases(&self) -> Vec<(u8, u32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SimOp::Erase { opcode, addr } => Some((*opcode, *addr)),
                _ => None,
            })
            .collect()
    }

    pub fn programs(&self) -> Vec<(u32, usize)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SimOp::Program { addr, len } => Some((*addr, *len)),
                _ => None,
            })
            .collect()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn quad_enabled(&self) -> bool {
        self.status2 & command::STATUS_QE != 0
    }

    pub fn delayed_us(&self) -> u64 {
        self.delayed_us
    }

    fn status1(&mut self) -> u8 {
        let mut status = 0;
        if self.faults.stuck_busy || self.busy_polls > 0 {
            status |= command::STATUS_BUSY;
            self.busy_polls = self.busy_polls.saturating_sub(1);
        }
        if self.write_enabled {
            status |= command::STATUS_WEL;
        }
        status
    }

    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>, SimError> {
        let start = addr as usize;
        let end = start.checked_add(len).ok_or(SimError::OutOfRange)?;
        if end > self.memory.len() {
            return Err(SimError::OutOfRange);
        }
        Ok(start..end)
    }

    fn erase(&mut self, opcode: u8, addr: u32) -> Result<(), SimError> {
        if self.faults.fail_erase {
            return Err(SimError::Injected);
        }
        self.ops.push(SimOp::Erase { opcode, addr });
        if !self.write_enabled {
            return Ok(());
        }
        let size = match opcode {
            command::SECTOR_ERASE => SECTOR_SIZE,
            command::BLOCK_ERASE_32K => BLOCK_32K_SIZE,
            _ => BLOCK_64K_SIZE,
        };
        // The device ignores the low address bits of an erase.
        let start = addr - addr % size;
        let range = self.range(start, size as usize)?;
        self.memory[range].fill(0xFF);
        self.write_enabled = false;
        self.busy_polls = BUSY_POLLS;
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), SimError> {
        if self.faults.fail_program {
            return Err(SimError::Injected);
        }
        self.ops.push(SimOp::Program {
            addr,
            len: data.len(),
        });
        if !self.write_enabled {
            return Ok(());
        }
        // Past the end of the page the device wraps to the page start.
        let page_start = addr - addr % PAGE_SIZE;
        for (i, byte) in data.iter().enumerate() {
            let offset = (addr % PAGE_SIZE + i as u32) % PAGE_SIZE;
            let index = (page_start + offset) as usize;
            if index >= self.memory.len() {
                return Err(SimError::OutOfRange);
            }
            self.memory[index] &= *byte;
        }
        self.write_enabled = false;
        self.busy_polls = BUSY_POLLS;
        Ok(())
    }
}

impl QspiBus for SimFlashBus {
    type Error = SimError;

    fn command(&mut self, cmd: &Command) -> Result<(), SimError> {
        if self.mapped {
            return Err(SimError::Mapped);
        }
        match (cmd.instruction, cmd.address) {
            (command::RESET_ENABLE, _) => {}
            (command::RESET_DEVICE, _) => {
                self.ops.push(SimOp::Reset);
                self.write_enabled = false;
                self.busy_polls = 0;
            }
            (command::WRITE_ENABLE, _) => {
                self.ops.push(SimOp::WriteEnable);
                if !self.faults.ignore_write_enable {
                    self.write_enabled = true;
                }
            }
            (command::CHIP_ERASE, _) => {
                if self.faults.fail_erase {
                    return Err(SimError::Injected);
                }
                self.ops.push(SimOp::ChipErase);
                if self.write_enabled {
                    self.memory.fill(0xFF);
                    self.write_enabled = false;
                    self.busy_polls = BUSY_POLLS;
                }
            }
            (
                opcode @ (command::SECTOR_ERASE | command::BLOCK_ERASE_32K | command::BLOCK_ERASE_64K),
                Some(addr),
            ) => self.erase(opcode, addr)?,
            _ => return Err(SimError::Injected),
        }
        Ok(())
    }

    fn command_read(&mut self, cmd: &Command, buf: &mut [u8]) -> Result<(), SimError> {
        if self.mapped {
            return Err(SimError::Mapped);
        }
        match (cmd.instruction, cmd.address) {
            (command::READ_STATUS_1, _) => buf.fill(self.status1()),
            (command::READ_STATUS_2, _) => buf.fill(self.status2),
            (command::READ_JEDEC_ID, _) => {
                self.ops.push(SimOp::ReadId);
                let id = self.jedec_id.to_be_bytes();
                for (out, byte) in buf.iter_mut().zip(id.iter().skip(1)) {
                    *out = *byte;
                }
            }
            (command::FAST_READ_QUAD_IO, Some(addr)) => {
                self.ops.push(SimOp::Read {
                    addr,
                    len: buf.len(),
                });
                let range = self.range(addr, buf.len())?;
                buf.copy_from_slice(&self.memory[range]);
            }
            _ => return Err(SimError::Injected),
        }
        Ok(())
    }

    fn command_write(&mut self, cmd: &Command, data: &[u8]) -> Result<(), SimError> {
        if self.mapped {
            return Err(SimError::Mapped);
        }
        match (cmd.instruction, cmd.address) {
            (command::QUAD_PAGE_PROGRAM, Some(addr)) => self.program(addr, data)?,
            (command::WRITE_STATUS_2, _) => {
                let value = data.first().copied().unwrap_or(0);
                self.ops.push(SimOp::WriteStatus2(value));
                if self.write_enabled {
                    self.status2 = value;
                    self.write_enabled = false;
                    self.busy_polls = BUSY_POLLS;
                }
            }
            _ => return Err(SimError::Injected),
        }
        Ok(())
    }

    fn set_memory_mapped(&mut self, enabled: bool) -> Result<(), SimError> {
        if enabled && self.faults.fail_map {
            return Err(SimError::Injected);
        }
        if enabled != self.mapped {
            self.ops.push(if enabled {
                SimOp::EnterMapped
            } else {
                SimOp::ExitMapped
            });
        }
        self.mapped = enabled;
        Ok(())
    }

    fn read_mapped(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), SimError> {
        if !self.mapped {
            return Err(SimError::NotMapped);
        }
        self.ops.push(SimOp::MappedRead {
            addr: offset,
            len: buf.len(),
        });
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        self.delayed_us = self.delayed_us.saturating_add(u64::from(us));
    }
}
