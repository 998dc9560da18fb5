//! Command set of the serial NOR part (Winbond W25Q compatible).

pub const RESET_ENABLE: u8 = 0x66;
pub const RESET_DEVICE: u8 = 0x99;
pub const READ_JEDEC_ID: u8 = 0x9F;
pub const WRITE_ENABLE: u8 = 0x06;
pub const READ_STATUS_1: u8 = 0x05;
pub const READ_STATUS_2: u8 = 0x35;
pub const WRITE_STATUS_2: u8 = 0x31;
pub const SECTOR_ERASE: u8 = 0x20;
pub const BLOCK_ERASE_32K: u8 = 0x52;
pub const BLOCK_ERASE_64K: u8 = 0xD8;
pub const CHIP_ERASE: u8 = 0xC7;
pub const QUAD_PAGE_PROGRAM: u8 = 0x32;
pub const FAST_READ_QUAD_IO: u8 = 0xEB;

/// Status register 1: erase or program in progress.
pub const STATUS_BUSY: u8 = 0x01;
/// Status register 1: write enable latch.
pub const STATUS_WEL: u8 = 0x02;
/// Status register 2: quad enable.
pub const STATUS_QE: u8 = 0x02;

/// Six dummy clocks for 0xEB: two for the mode byte, four wait states.
pub const QUAD_READ_DUMMY_CYCLES: u8 = 6;

/// Number of data lines used for the address and data phases.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Lanes {
    Single,
    Quad,
}

/// One instruction frame on the bus. The instruction phase is always single
/// line; the data phase, if any, is supplied by the `QspiBus` method that
/// carries the frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    pub instruction: u8,
    pub address: Option<u32>,
    pub address_lanes: Lanes,
    pub data_lanes: Lanes,
    pub dummy_cycles: u8,
}

impl Command {
    pub const fn new(instruction: u8) -> Self {
        Self {
            instruction,
            address: None,
            address_lanes: Lanes::Single,
            data_lanes: Lanes::Single,
            dummy_cycles: 0,
        }
    }

    pub const fn with_address(instruction: u8, address: u32) -> Self {
        Self {
            instruction,
            address: Some(address),
            address_lanes: Lanes::Single,
            data_lanes: Lanes::Single,
            dummy_cycles: 0,
        }
    }

    pub const fn quad_address(mut self) -> Self {
        self.address_lanes = Lanes::Quad;
        self
    }

    pub const fn quad_data(mut self) -> Self {
        self.data_lanes = Lanes::Quad;
        self
    }

    pub const fn dummy(mut self, cycles: u8) -> Self {
        self.dummy_cycles = cycles;
        self
    }
}
