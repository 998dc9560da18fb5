//! The persisted superblock describing both slots.
//!
//! Encoded as a fixed 128-byte little-endian record whose last word is a
//! CRC32 over everything before it.

use core::ops::Range;

use flash_driver::crc::crc32;

use crate::error::UpdateError;
use crate::layout::FlashLayout;
use crate::slot::Slot;

pub const METADATA_MAGIC: u32 = 0x5346_4D47;
pub const METADATA_VERSION: u32 = 1;
pub const METADATA_SIZE: usize = 128;

const SLOT_RECORD_SIZE: usize = 20;
const SLOT_A_OFFSET: usize = 8;
const SLOT_B_OFFSET: usize = SLOT_A_OFFSET + SLOT_RECORD_SIZE;
const CURRENT_SLOT_OFFSET: usize = 48;
const UPGRADE_SLOT_OFFSET: usize = 49;
const BOOT_COUNT_OFFSET: usize = 50;
const ROLLBACK_OFFSET: usize = 51;
const BOOT_TIMESTAMP_OFFSET: usize = 52;
const UPGRADE_TIMESTAMP_OFFSET: usize = 56;
const RESERVED: Range<usize> = 60..124;
const CRC_OFFSET: usize = 124;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotRecord {
    pub version: u32,
    pub base_address: u32,
    /// Bytes of application image covered by `crc32`.
    pub size: u32,
    /// Holds a complete, committed image.
    pub valid: bool,
    /// Result of the last integrity check. Re-verify before relying on it.
    pub crc_valid: bool,
    pub crc32: u32,
}

impl SlotRecord {
    pub const fn empty(base_address: u32) -> Self {
        Self {
            version: 0,
            base_address,
            size: 0,
            valid: false,
            crc_valid: false,
            crc32: 0,
        }
    }

    fn encode(&self, bytes: &mut [u8], at: usize) -> Result<(), UpdateError> {
        put_u32_le(bytes, at, self.version)?;
        put_u32_le(bytes, offset(at, 4)?, self.base_address)?;
        put_u32_le(bytes, offset(at, 8)?, self.size)?;
        put_u8(bytes, offset(at, 12)?, u8::from(self.valid))?;
        put_u8(bytes, offset(at, 13)?, u8::from(self.crc_valid))?;
        put_u8(bytes, offset(at, 14)?, 0)?;
        put_u8(bytes, offset(at, 15)?, 0)?;
        put_u32_le(bytes, offset(at, 16)?, self.crc32)
    }

    fn decode(bytes: &[u8], at: usize) -> Result<Self, UpdateError> {
        Ok(Self {
            version: read_u32_le(bytes, at)?,
            base_address: read_u32_le(bytes, offset(at, 4)?)?,
            size: read_u32_le(bytes, offset(at, 8)?)?,
            valid: read_bool(bytes, offset(at, 12)?)?,
            crc_valid: read_bool(bytes, offset(at, 13)?)?,
            crc32: read_u32_le(bytes, offset(at, 16)?)?,
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareMetadata {
    pub magic: u32,
    pub schema_version: u32,
    pub slot_a: SlotRecord,
    pub slot_b: SlotRecord,
    pub current_slot: Slot,
    pub upgrade_slot: Slot,
    pub boot_count: u8,
    pub rollback_enabled: bool,
    pub boot_timestamp: u32,
    pub upgrade_timestamp: u32,
    pub metadata_crc32: u32,
}

impl FirmwareMetadata {
    /// Factory state: slot A holds version 1 and runs, slot B is empty.
    ///
    /// Slot A is trusted without a checksum, so `crc_valid` stays false.
    pub const fn new_default(layout: &FlashLayout) -> Self {
        let mut slot_a = SlotRecord::empty(layout.slot_a.base);
        slot_a.version = 1;
        slot_a.valid = true;
        Self {
            magic: METADATA_MAGIC,
            schema_version: METADATA_VERSION,
            slot_a,
            slot_b: SlotRecord::empty(layout.slot_b.base),
            current_slot: Slot::A,
            upgrade_slot: Slot::B,
            boot_count: 0,
            rollback_enabled: true,
            boot_timestamp: 0,
            upgrade_timestamp: 0,
            metadata_crc32: 0,
        }
    }

    pub const fn record(&self, slot: Slot) -> &SlotRecord {
        match slot {
            Slot::A => &self.slot_a,
            Slot::B => &self.slot_b,
        }
    }

    pub fn record_mut(&mut self, slot: Slot) -> &mut SlotRecord {
        match slot {
            Slot::A => &mut self.slot_a,
            Slot::B => &mut self.slot_b,
        }
    }

    /// Encodes every field, writing `metadata_crc32` as stored.
    pub fn encode(&self) -> Result<[u8; METADATA_SIZE], UpdateError> {
        let mut bytes = [0u8; METADATA_SIZE];
        put_u32_le(&mut bytes, 0, self.magic)?;
        put_u32_le(&mut bytes, 4, self.schema_version)?;
        self.slot_a.encode(&mut bytes, SLOT_A_OFFSET)?;
        self.slot_b.encode(&mut bytes, SLOT_B_OFFSET)?;
        put_u8(&mut bytes, CURRENT_SLOT_OFFSET, self.current_slot.to_byte())?;
        put_u8(&mut bytes, UPGRADE_SLOT_OFFSET, self.upgrade_slot.to_byte())?;
        put_u8(&mut bytes, BOOT_COUNT_OFFSET, self.boot_count)?;
        put_u8(&mut bytes, ROLLBACK_OFFSET, u8::from(self.rollback_enabled))?;
        put_u32_le(&mut bytes, BOOT_TIMESTAMP_OFFSET, self.boot_timestamp)?;
        put_u32_le(&mut bytes, UPGRADE_TIMESTAMP_OFFSET, self.upgrade_timestamp)?;
        bytes
            .get_mut(RESERVED)
            .ok_or(UpdateError::InvalidMetadata)?
            .fill(0xFF);
        put_u32_le(&mut bytes, CRC_OFFSET, self.metadata_crc32)?;
        Ok(bytes)
    }

    /// CRC32 over the encoded bytes preceding the checksum field.
    pub fn compute_crc(&self) -> Result<u32, UpdateError> {
        let bytes = self.encode()?;
        Ok(crc32(
            bytes
                .get(..CRC_OFFSET)
                .ok_or(UpdateError::InvalidMetadata)?,
        ))
    }

    /// Copy with `metadata_crc32` recomputed.
    pub fn sealed(&self) -> Result<Self, UpdateError> {
        let mut sealed = *self;
        sealed.metadata_crc32 = self.compute_crc()?;
        Ok(sealed)
    }

    /// Magic, checksum and slot base addresses all check out.
    pub fn is_valid(&self, layout: &FlashLayout) -> bool {
        self.magic == METADATA_MAGIC
            && self.compute_crc() == Ok(self.metadata_crc32)
            && self.slot_a.base_address == layout.slot_a.base
            && self.slot_b.base_address == layout.slot_b.base
    }

    /// Decodes and validates a record read from flash. Any failure is
    /// `InvalidMetadata`; a bad `upgrade_slot` is repaired rather than
    /// rejected.
    pub fn from_bytes(
        bytes: &[u8; METADATA_SIZE],
        layout: &FlashLayout,
    ) -> Result<Self, UpdateError> {
        let magic = read_u32_le(bytes, 0)?;
        if magic != METADATA_MAGIC {
            return Err(UpdateError::InvalidMetadata);
        }
        let stored_crc = read_u32_le(bytes, CRC_OFFSET)?;
        let body = bytes
            .get(..CRC_OFFSET)
            .ok_or(UpdateError::InvalidMetadata)?;
        if crc32(body) != stored_crc {
            return Err(UpdateError::InvalidMetadata);
        }
        let current_slot = Slot::from_byte(read_u8(bytes, CURRENT_SLOT_OFFSET)?)
            .ok_or(UpdateError::InvalidMetadata)?;
        let upgrade_slot = match Slot::from_byte(read_u8(bytes, UPGRADE_SLOT_OFFSET)?) {
            Some(slot) if slot != current_slot => slot,
            _ => current_slot.other(),
        };
        let metadata = Self {
            magic,
            schema_version: read_u32_le(bytes, 4)?,
            slot_a: SlotRecord::decode(bytes, SLOT_A_OFFSET)?,
            slot_b: SlotRecord::decode(bytes, SLOT_B_OFFSET)?,
            current_slot,
            upgrade_slot,
            boot_count: read_u8(bytes, BOOT_COUNT_OFFSET)?,
            rollback_enabled: read_bool(bytes, ROLLBACK_OFFSET)?,
            boot_timestamp: read_u32_le(bytes, BOOT_TIMESTAMP_OFFSET)?,
            upgrade_timestamp: read_u32_le(bytes, UPGRADE_TIMESTAMP_OFFSET)?,
            metadata_crc32: stored_crc,
        };
        if metadata.slot_a.base_address != layout.slot_a.base
            || metadata.slot_b.base_address != layout.slot_b.base
        {
            return Err(UpdateError::InvalidMetadata);
        }
        Ok(metadata)
    }
}

fn offset(at: usize, by: usize) -> Result<usize, UpdateError> {
    at.checked_add(by).ok_or(UpdateError::InvalidMetadata)
}

fn put_u32_le(bytes: &mut [u8], at: usize, value: u32) -> Result<(), UpdateError> {
    bytes
        .get_mut(at..offset(at, 4)?)
        .ok_or(UpdateError::InvalidMetadata)?
        .copy_from_slice(&value.to_le_bytes());
    Ok(())
}

fn put_u8(bytes: &mut [u8], at: usize, value: u8) -> Result<(), UpdateError> {
    *bytes.get_mut(at).ok_or(UpdateError::InvalidMetadata)? = value;
    Ok(())
}

fn read_u32_le(bytes: &[u8], at: usize) -> Result<u32, UpdateError> {
    let chunk = bytes
        .get(at..offset(at, 4)?)
        .ok_or(UpdateError::InvalidMetadata)?
        .try_into()
        .map_err(|_| UpdateError::InvalidMetadata)?;
    Ok(u32::from_le_bytes(chunk))
}

fn read_u8(bytes: &[u8], at: usize) -> Result<u8, UpdateError> {
    bytes.get(at).copied().ok_or(UpdateError::InvalidMetadata)
}

fn read_bool(bytes: &[u8], at: usize) -> Result<bool, UpdateError> {
    match read_u8(bytes, at)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(UpdateError::InvalidMetadata),
    }
}
