//! Device geometry and the description of the expected flash part.

/// Largest span a single program command may cover.
pub const PAGE_SIZE: u32 = 256;
/// Smallest erase unit.
pub const SECTOR_SIZE: u32 = 4 * 1024;
pub const BLOCK_32K_SIZE: u32 = 32 * 1024;
pub const BLOCK_64K_SIZE: u32 = 64 * 1024;

/// Worst-case operation times, in microseconds, and the busy-poll interval.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeouts {
    pub page_program_us: u32,
    pub sector_erase_us: u32,
    pub block_32k_erase_us: u32,
    pub block_64k_erase_us: u32,
    pub chip_erase_us: u32,
    pub status_write_us: u32,
    pub poll_interval_us: u32,
}

impl Timeouts {
    /// Number of status polls that fit in `timeout_us`, at least one.
    pub const fn polls(&self, timeout_us: u32) -> u32 {
        if self.poll_interval_us == 0 {
            return timeout_us;
        }
        let polls = timeout_us / self.poll_interval_us;
        if polls == 0 { 1 } else { polls }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashPart {
    pub name: &'static str,
    /// Manufacturer, memory type and capacity bytes of the 0x9F response.
    pub jedec_id: u32,
    pub capacity: u32,
    pub timeouts: Timeouts,
}

impl FlashPart {
    pub const fn sector_count(&self) -> u32 {
        self.capacity / SECTOR_SIZE
    }
}

/// Winbond W25Q16JV, 16 Mbit. Timeouts are the datasheet maximums.
pub const W25Q16JV: FlashPart = FlashPart {
    name: "W25Q16JV",
    jedec_id: 0x00EF_4015,
    capacity: 2 * 1024 * 1024,
    timeouts: Timeouts {
        page_program_us: 3_000,
        sector_erase_us: 400_000,
        block_32k_erase_us: 1_600_000,
        block_64k_erase_us: 2_000_000,
        chip_erase_us: 25_000_000,
        status_write_us: 15_000,
        poll_interval_us: 10,
    },
};

/// Winbond W25Q128JV, 128 Mbit.
pub const W25Q128JV: FlashPart = FlashPart {
    name: "W25Q128JV",
    jedec_id: 0x00EF_4018,
    capacity: 16 * 1024 * 1024,
    timeouts: Timeouts {
        page_program_us: 3_000,
        sector_erase_us: 400_000,
        block_32k_erase_us: 1_600_000,
        block_64k_erase_us: 2_000_000,
        chip_erase_us: 200_000_000,
        status_write_us: 15_000,
        poll_interval_us: 10,
    },
};
