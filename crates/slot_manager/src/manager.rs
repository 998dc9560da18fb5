use flash_driver::crc::Crc32Digest;
use flash_driver::{FlashDriver, PAGE_SIZE, QspiBus};

use crate::error::UpdateError;
use crate::layout::{SlotLayout, SlotRegion, UpdateConfig};
use crate::metadata::{FirmwareMetadata, METADATA_SIZE, SlotRecord};
use crate::slot::Slot;

/// Everything known about one slot, without touching flash.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotInfo {
    pub slot: Slot,
    pub layout: SlotLayout,
    pub record: SlotRecord,
    /// Address of the vector table in the XIP window.
    pub application_address: u32,
}

/// Owns the metadata record and every transition between slots.
///
/// Each transition builds the next record on a copy, persists it, and only
/// then replaces the in-memory record, so a failed write leaves the manager
/// exactly as it was.
pub struct UpdateManager<'a, B: QspiBus> {
    flash: &'a mut FlashDriver<B>,
    config: UpdateConfig,
    metadata: FirmwareMetadata,
}

impl<'a, B: QspiBus> UpdateManager<'a, B> {
    pub fn new(flash: &'a mut FlashDriver<B>, config: UpdateConfig) -> Result<Self, UpdateError> {
        config.layout.check(flash.capacity())?;
        Ok(Self {
            flash,
            metadata: FirmwareMetadata::new_default(&config.layout),
            config,
        })
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    pub fn metadata(&self) -> &FirmwareMetadata {
        &self.metadata
    }

    pub fn flash(&mut self) -> &mut FlashDriver<B> {
        &mut *self.flash
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Loads the persisted record, or writes factory defaults when there is
    /// none. The defaults are adopted even if writing them fails.
    pub fn init(&mut self) -> Result<(), UpdateError> {
        if !self.config.enabled {
            info!("dual-slot updates disabled, running slot A");
            return Ok(());
        }
        match self.load_metadata() {
            Ok(metadata) => {
                info!(
                    "metadata loaded: current {:?}, boot count {}",
                    metadata.current_slot,
                    metadata.boot_count
                );
                self.metadata = metadata;
                Ok(())
            }
            Err(err) => {
                warn!("no usable metadata ({}), writing defaults", err);
                let defaults = FirmwareMetadata::new_default(&self.config.layout);
                self.metadata = defaults;
                self.save_metadata(&defaults)
            }
        }
    }

    /// Reads and validates the record on flash without adopting it.
    pub fn load_metadata(&mut self) -> Result<FirmwareMetadata, UpdateError> {
        let addr = self.config.layout.metadata;
        let mut bytes = [0u8; METADATA_SIZE];
        let mut flash = self.flash.command_mode()?;
        flash.read_buffer(addr, &mut bytes)?;
        flash.finish()?;
        FirmwareMetadata::from_bytes(&bytes, &self.config.layout)
    }

    /// Persists `metadata` with a fresh checksum and adopts it once written.
    pub fn save_metadata(&mut self, metadata: &FirmwareMetadata) -> Result<(), UpdateError> {
        if !self.config.enabled {
            return Err(UpdateError::Disabled);
        }
        let sealed = metadata.sealed()?;
        let bytes = sealed.encode()?;
        let addr = self.config.layout.metadata;
        let restored = {
            let mut flash = self.flash.command_mode()?;
            flash.sector_erase(addr)?;
            flash.program_buffer(addr, &bytes)?;
            flash.finish()
        };
        debug!("metadata saved, crc {:#x}", sealed.metadata_crc32);
        // The record is on flash even if mapped mode could not be restored.
        self.metadata = sealed;
        restored.map_err(UpdateError::from)
    }

    pub fn slot_info(&self, slot: Slot) -> SlotInfo {
        SlotInfo {
            slot,
            layout: *self.config.layout.slot(slot),
            record: *self.metadata.record(slot),
            application_address: self.slot_application_address(slot),
        }
    }

    pub fn slot_application_address(&self, slot: Slot) -> u32 {
        let offset = self.config.layout.slot(slot).application.offset;
        self.config.xip_base.saturating_add(offset)
    }

    /// Flash offset of one of a slot's sub-regions.
    pub fn slot_region_address(&self, slot: Slot, region: SlotRegion) -> u32 {
        self.config.layout.slot(slot).region(region).offset
    }

    pub fn current_slot(&self) -> Slot {
        if self.config.enabled {
            self.metadata.current_slot
        } else {
            Slot::A
        }
    }

    pub fn upgrade_slot(&self) -> Slot {
        if self.config.enabled {
            self.metadata.upgrade_slot
        } else {
            Slot::A
        }
    }

    pub fn set_current_slot(&mut self, slot: Slot) -> Result<(), UpdateError> {
        self.ensure_enabled()?;
        let mut next = self.metadata;
        next.current_slot = slot;
        next.upgrade_slot = slot.other();
        self.save_metadata(&next)?;
        info!("current slot is now {:?}", slot);
        Ok(())
    }

    /// Checks that the slot is committed and that its vector table points
    /// into RAM and at Thumb code inside the slot's own application region.
    pub fn validate_slot(&mut self, slot: Slot) -> Result<(), UpdateError> {
        if !self.metadata.record(slot).valid {
            return Err(UpdateError::SlotNotMarkedValid);
        }
        let mut vectors = [0u8; 8];
        let addr = self.config.layout.slot(slot).application.offset;
        self.flash.read_buffer(addr, &mut vectors)?;
        let (sp, reset) = vectors
            .split_at_checked(4)
            .ok_or(UpdateError::InvalidVectorTable)?;
        let sp = u32::from_le_bytes(sp.try_into().map_err(|_| UpdateError::InvalidVectorTable)?);
        let reset =
            u32::from_le_bytes(reset.try_into().map_err(|_| UpdateError::InvalidVectorTable)?);

        if !self.config.ram_contains(sp) {
            warn!("slot {:?}: stack pointer {:#x} outside RAM", slot, sp);
            return Err(UpdateError::InvalidVectorTable);
        }
        let application = self.config.layout.slot(slot).application;
        let code_start = self.config.xip_base.saturating_add(application.offset);
        let code_end = code_start.saturating_add(application.size);
        if reset < code_start || reset >= code_end || reset & 1 == 0 {
            warn!("slot {:?}: bad reset vector {:#x}", slot, reset);
            return Err(UpdateError::InvalidVectorTable);
        }
        Ok(())
    }

    /// Makes the other slot current if it holds a valid image.
    pub fn switch_slot(&mut self) -> Result<(), UpdateError> {
        self.ensure_enabled()?;
        let target = self.metadata.current_slot.other();
        self.validate_slot(target)?;
        self.set_current_slot(target)
    }

    /// Invalidates the slot on flash, then erases all of it.
    pub fn erase_slot(&mut self, slot: Slot) -> Result<(), UpdateError> {
        self.ensure_staging_slot(slot)?;
        let record = self.metadata.record(slot);
        if record.valid || record.crc_valid {
            let mut next = self.metadata;
            let record = next.record_mut(slot);
            record.valid = false;
            record.crc_valid = false;
            self.save_metadata(&next)?;
        }
        let layout = *self.config.layout.slot(slot);
        let mut flash = self.flash.command_mode()?;
        flash.buffer_erase(layout.base, layout.size)?;
        flash.finish()?;
        info!("slot {:?} erased", slot);
        Ok(())
    }

    /// Programs bytes at `offset` within one region of an erased slot and
    /// reads them back. Bits can only be cleared, so each byte should be
    /// written once.
    pub fn write_slot(
        &mut self,
        slot: Slot,
        region: SlotRegion,
        offset: u32,
        data: &[u8],
    ) -> Result<(), UpdateError> {
        self.ensure_staging_slot(slot)?;
        if self.metadata.record(slot).valid {
            return Err(UpdateError::SlotCommitted);
        }
        let region = self.config.layout.slot(slot).region(region);
        let len = u32::try_from(data.len()).map_err(|_| UpdateError::OutOfBounds)?;
        let end = offset.checked_add(len).ok_or(UpdateError::OutOfBounds)?;
        if end > region.size {
            return Err(UpdateError::OutOfBounds);
        }
        let addr = region
            .offset
            .checked_add(offset)
            .ok_or(UpdateError::OutOfBounds)?;
        let mut flash = self.flash.command_mode()?;
        flash.program_buffer(addr, data)?;
        verify_written(&mut *flash, addr, data)?;
        flash.finish()?;
        Ok(())
    }

    /// Recomputes the committed image checksum and persists the outcome.
    pub fn verify_slot_crc(&mut self, slot: Slot) -> Result<(), UpdateError> {
        self.ensure_enabled()?;
        let record = *self.metadata.record(slot);
        if !record.valid {
            return Err(UpdateError::SlotNotMarkedValid);
        }
        // A record without a size has nothing to compare against.
        let matches = record.size != 0 && self.image_crc(slot, record.size)? == record.crc32;
        if matches != record.crc_valid {
            let mut next = self.metadata;
            next.record_mut(slot).crc_valid = matches;
            self.save_metadata(&next)?;
        }
        if matches {
            Ok(())
        } else {
            warn!("slot {:?} checksum mismatch", slot);
            Err(UpdateError::CrcMismatch)
        }
    }

    /// Marks a fully written image as committed after checking its checksum.
    pub fn commit_slot(
        &mut self,
        slot: Slot,
        version: u32,
        size: u32,
        crc32: u32,
        now: u32,
    ) -> Result<(), UpdateError> {
        self.ensure_staging_slot(slot)?;
        let layout = *self.config.layout.slot(slot);
        if size == 0 || size > layout.application.size {
            return Err(UpdateError::OutOfBounds);
        }
        if self.image_crc(slot, size)? != crc32 {
            warn!("slot {:?} image does not match crc {:#x}", slot, crc32);
            return Err(UpdateError::CrcMismatch);
        }
        let mut next = self.metadata;
        *next.record_mut(slot) = SlotRecord {
            version,
            base_address: layout.base,
            size,
            valid: true,
            crc_valid: true,
            crc32,
        };
        next.upgrade_slot = slot;
        next.upgrade_timestamp = now;
        self.save_metadata(&next)?;
        info!("slot {:?} committed version {}", slot, version);
        Ok(())
    }

    pub fn record_boot(&mut self, now: u32) -> Result<(), UpdateError> {
        self.ensure_enabled()?;
        let mut next = self.metadata;
        next.boot_count = next.boot_count.saturating_add(1);
        next.boot_timestamp = now;
        self.save_metadata(&next)
    }

    /// The running image is good; stop counting boots against it.
    pub fn confirm_boot(&mut self) -> Result<(), UpdateError> {
        self.ensure_enabled()?;
        if self.metadata.boot_count == 0 {
            return Ok(());
        }
        let mut next = self.metadata;
        next.boot_count = 0;
        self.save_metadata(&next)
    }

    /// Falls back to the other slot after `max_attempts` unconfirmed boots.
    /// Returns whether the current slot changed.
    pub fn check_rollback(&mut self, max_attempts: u8) -> Result<bool, UpdateError> {
        if !self.config.enabled
            || !self.metadata.rollback_enabled
            || self.metadata.boot_count < max_attempts
        {
            return Ok(false);
        }
        let target = self.metadata.current_slot.other();
        self.validate_slot(target)?;
        let mut next = self.metadata;
        next.current_slot = target;
        next.upgrade_slot = target.other();
        next.boot_count = 0;
        self.save_metadata(&next)?;
        warn!("rolled back to slot {:?}", target);
        Ok(true)
    }

    pub fn set_rollback_enabled(&mut self, enabled: bool) -> Result<(), UpdateError> {
        self.ensure_enabled()?;
        if self.metadata.rollback_enabled == enabled {
            return Ok(());
        }
        let mut next = self.metadata;
        next.rollback_enabled = enabled;
        self.save_metadata(&next)
    }

    fn ensure_enabled(&self) -> Result<(), UpdateError> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(UpdateError::Disabled)
        }
    }

    fn ensure_staging_slot(&self, slot: Slot) -> Result<(), UpdateError> {
        self.ensure_enabled()?;
        if slot == self.metadata.current_slot {
            return Err(UpdateError::SlotActive);
        }
        Ok(())
    }

    /// CRC32 of the first `size` bytes of the slot's application region.
    fn image_crc(&mut self, slot: Slot, size: u32) -> Result<u32, UpdateError> {
        let application = self.config.layout.slot(slot).application;
        if size > application.size {
            return Err(UpdateError::InvalidMetadata);
        }
        let end = application
            .offset
            .checked_add(size)
            .ok_or(UpdateError::InvalidMetadata)?;
        let mut digest = Crc32Digest::new();
        let mut chunk = [0u8; PAGE_SIZE as usize];
        let mut addr = application.offset;
        while addr < end {
            let len = end.saturating_sub(addr).min(PAGE_SIZE);
            let buf = chunk
                .get_mut(..len as usize)
                .ok_or(UpdateError::InvalidMetadata)?;
            self.flash.read_buffer(addr, buf)?;
            digest.update(buf);
            addr = addr.saturating_add(len);
        }
        Ok(digest.finalize())
    }
}

/// Reads `data` back from `addr` a page at a time and compares.
fn verify_written<B: QspiBus>(
    flash: &mut FlashDriver<B>,
    addr: u32,
    data: &[u8],
) -> Result<(), UpdateError> {
    let mut chunk = [0u8; PAGE_SIZE as usize];
    let mut addr = addr;
    for expected in data.chunks(PAGE_SIZE as usize) {
        let actual = chunk
            .get_mut(..expected.len())
            .ok_or(UpdateError::VerifyFailed)?;
        flash.read_buffer(addr, actual)?;
        if *actual != *expected {
            warn!("read-back mismatch near {:#x}", addr);
            return Err(UpdateError::VerifyFailed);
        }
        addr = addr.saturating_add(PAGE_SIZE);
    }
    Ok(())
}
