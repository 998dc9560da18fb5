#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! Block driver for a serial NOR flash shared between command mode and a
//! memory-mapped (execute in place) window.

// This must go first so the logging macros are visible to the other modules.
mod fmt;

mod blob;
pub mod block_device;
pub mod bus;
pub mod command;
pub mod crc;
mod driver;
pub mod erase;
mod error;
mod mode;
pub mod part;

#[cfg(any(test, feature = "sim"))]
extern crate std;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use block_device::BlockDevice;
pub use bus::QspiBus;
pub use driver::FlashDriver;
pub use error::FlashError;
pub use mode::CommandMode;
pub use part::{BLOCK_32K_SIZE, BLOCK_64K_SIZE, FlashPart, PAGE_SIZE, SECTOR_SIZE};
