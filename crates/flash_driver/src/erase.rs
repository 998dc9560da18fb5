//! Erase granularity selection for `buffer_erase`.
//!
//! Block erases are far cheaper per byte than sector erases, so a range is
//! covered greedily: at each position the largest unit that is aligned there
//! and fits in what is left.

use crate::command;
use crate::error::FlashError;
use crate::part::{BLOCK_32K_SIZE, BLOCK_64K_SIZE, SECTOR_SIZE};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EraseGranularity {
    Sector,
    Block32K,
    Block64K,
}

impl EraseGranularity {
    /// Largest first.
    pub const ALL: [EraseGranularity; 3] = [
        EraseGranularity::Block64K,
        EraseGranularity::Block32K,
        EraseGranularity::Sector,
    ];

    pub const fn size(self) -> u32 {
        match self {
            EraseGranularity::Sector => SECTOR_SIZE,
            EraseGranularity::Block32K => BLOCK_32K_SIZE,
            EraseGranularity::Block64K => BLOCK_64K_SIZE,
        }
    }

    pub const fn opcode(self) -> u8 {
        match self {
            EraseGranularity::Sector => command::SECTOR_ERASE,
            EraseGranularity::Block32K => command::BLOCK_ERASE_32K,
            EraseGranularity::Block64K => command::BLOCK_ERASE_64K,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EraseStep {
    pub addr: u32,
    pub granularity: EraseGranularity,
    pub next_addr: u32,
}

/// Pick the erase that starts at `addr` for a range with `remaining` bytes
/// left. `addr` must be sector aligned and `remaining` a non-zero multiple of
/// the sector size.
pub fn next_erase(addr: u32, remaining: u32) -> Result<EraseStep, FlashError> {
    if addr % SECTOR_SIZE != 0 {
        return Err(FlashError::InvalidAddress);
    }
    if remaining == 0 || remaining % SECTOR_SIZE != 0 {
        return Err(FlashError::InvalidLength);
    }
    let granularity = EraseGranularity::ALL
        .into_iter()
        .find(|g| addr % g.size() == 0 && remaining >= g.size())
        .unwrap_or(EraseGranularity::Sector);
    let next_addr = addr
        .checked_add(granularity.size())
        .ok_or(FlashError::InvalidAddress)?;
    Ok(EraseStep {
        addr,
        granularity,
        next_addr,
    })
}

/// The sequence of erases covering `[start, start + len)`.
#[derive(Debug, Clone)]
pub struct ErasePlan {
    addr: u32,
    end: u32,
    failed: bool,
}

impl ErasePlan {
    pub fn new(start: u32, len: u32) -> Result<Self, FlashError> {
        if start % SECTOR_SIZE != 0 {
            return Err(FlashError::InvalidAddress);
        }
        if len % SECTOR_SIZE != 0 {
            return Err(FlashError::InvalidLength);
        }
        let end = start.checked_add(len).ok_or(FlashError::InvalidAddress)?;
        Ok(Self {
            addr: start,
            end,
            failed: false,
        })
    }
}

impl Iterator for ErasePlan {
    type Item = Result<EraseStep, FlashError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.addr >= self.end {
            return None;
        }
        let remaining = self.end.checked_sub(self.addr)?;
        let step = next_erase(self.addr, remaining);
        match step {
            Ok(step) => self.addr = step.next_addr,
            Err(_) => self.failed = true,
        }
        Some(step)
    }
}
