//! Static placement of the metadata sector and the two image slots.
//!
//! All offsets are flash offsets from the start of the device. The XIP window
//! maps offset 0 to [`UpdateConfig::xip_base`].

use flash_driver::SECTOR_SIZE;

use crate::error::UpdateError;
use crate::slot::Slot;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    pub offset: u32,
    pub size: u32,
}

impl Region {
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    pub const fn end(&self) -> Option<u32> {
        self.offset.checked_add(self.size)
    }

    fn within(&self, outer: &Region) -> bool {
        match (self.end(), outer.end()) {
            (Some(end), Some(outer_end)) => self.offset >= outer.offset && end <= outer_end,
            _ => false,
        }
    }

    fn overlaps(&self, other: &Region) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => self.offset < other_end && other.offset < end,
            _ => true,
        }
    }

    fn sector_aligned(&self) -> bool {
        self.offset % SECTOR_SIZE == 0 && self.size % SECTOR_SIZE == 0
    }
}

/// Sub-ranges of a slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotRegion {
    Application,
    WebAssets,
    Calibration,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotLayout {
    pub base: u32,
    pub size: u32,
    /// Starts with the vector table.
    pub application: Region,
    pub web_assets: Region,
    pub calibration: Region,
}

impl SlotLayout {
    /// Carves a slot into application, web assets and calibration, in that
    /// order.
    pub const fn new(base: u32, application: u32, web_assets: u32, calibration: u32) -> Self {
        let assets_at = base.saturating_add(application);
        let calibration_at = assets_at.saturating_add(web_assets);
        Self {
            base,
            size: application
                .saturating_add(web_assets)
                .saturating_add(calibration),
            application: Region::new(base, application),
            web_assets: Region::new(assets_at, web_assets),
            calibration: Region::new(calibration_at, calibration),
        }
    }

    pub const fn region(&self, region: SlotRegion) -> Region {
        match region {
            SlotRegion::Application => self.application,
            SlotRegion::WebAssets => self.web_assets,
            SlotRegion::Calibration => self.calibration,
        }
    }

    pub const fn span(&self) -> Region {
        Region::new(self.base, self.size)
    }

    fn check(&self) -> Result<(), UpdateError> {
        let span = self.span();
        let regions = [self.application, self.web_assets, self.calibration];
        if !span.sector_aligned() || span.end().is_none() {
            return Err(UpdateError::InvalidLayout);
        }
        // Room for at least the stack pointer and reset vector.
        if self.application.size < 8 {
            return Err(UpdateError::InvalidLayout);
        }
        for (idx, region) in regions.iter().enumerate() {
            if !region.sector_aligned() || !region.within(&span) {
                return Err(UpdateError::InvalidLayout);
            }
            for other in regions.iter().skip(idx.saturating_add(1)) {
                if region.size != 0 && other.size != 0 && region.overlaps(other) {
                    return Err(UpdateError::InvalidLayout);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashLayout {
    /// Sector holding the metadata record and nothing else.
    pub metadata: u32,
    pub slot_a: SlotLayout,
    pub slot_b: SlotLayout,
}

impl FlashLayout {
    pub const fn slot(&self, slot: Slot) -> &SlotLayout {
        match slot {
            Slot::A => &self.slot_a,
            Slot::B => &self.slot_b,
        }
    }

    /// Rejects layouts that are misaligned, overlap, or do not fit in a device
    /// of `capacity` bytes.
    pub fn check(&self, capacity: u32) -> Result<(), UpdateError> {
        let device = Region::new(0, capacity);
        let metadata = Region::new(self.metadata, SECTOR_SIZE);
        self.slot_a.check()?;
        self.slot_b.check()?;
        let spans = [metadata, self.slot_a.span(), self.slot_b.span()];
        for (idx, span) in spans.iter().enumerate() {
            if !span.sector_aligned() || !span.within(&device) {
                return Err(UpdateError::InvalidLayout);
            }
            for other in spans.iter().skip(idx.saturating_add(1)) {
                if span.overlaps(other) {
                    return Err(UpdateError::InvalidLayout);
                }
            }
        }
        Ok(())
    }
}

/// 2 MiB part: 64K bootloader, one metadata sector, two 896K slots.
pub const DEFAULT_LAYOUT: FlashLayout = FlashLayout {
    metadata: 0x0001_0000,
    slot_a: SlotLayout::new(0x0002_0000, 0x000C_0000, 0x0001_8000, 0x0000_8000),
    slot_b: SlotLayout::new(0x0010_0000, 0x000C_0000, 0x0001_8000, 0x0000_8000),
};

pub const DEFAULT_XIP_BASE: u32 = 0x1000_0000;
pub const DEFAULT_RAM_START: u32 = 0x2000_0000;
pub const DEFAULT_RAM_END: u32 = 0x2004_2000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateConfig {
    /// When false the manager runs a single image from slot A.
    pub enabled: bool,
    pub layout: FlashLayout,
    pub xip_base: u32,
    pub ram_start: u32,
    /// Inclusive; the initial stack pointer usually sits exactly here.
    pub ram_end: u32,
}

impl UpdateConfig {
    pub const fn new(layout: FlashLayout) -> Self {
        Self {
            enabled: cfg!(feature = "dual-slot"),
            layout,
            xip_base: DEFAULT_XIP_BASE,
            ram_start: DEFAULT_RAM_START,
            ram_end: DEFAULT_RAM_END,
        }
    }

    pub const fn ram_contains(&self, addr: u32) -> bool {
        addr >= self.ram_start && addr <= self.ram_end
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LAYOUT)
    }
}
