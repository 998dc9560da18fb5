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

//! Dual-slot (A/B) firmware update manager on top of [`flash_driver`].
//!
//! A 128-byte metadata record in its own sector says which slot runs, which
//! slot receives the next image, and how many times the running image has
//! booted without being confirmed. Every transition rewrites that record.

// This must go first so the logging macros are visible to the other modules.
mod fmt;

mod error;
pub mod layout;
mod manager;
pub mod metadata;
mod slot;

#[cfg(test)]
extern crate std;

pub use error::UpdateError;
pub use layout::{FlashLayout, Region, SlotLayout, SlotRegion, UpdateConfig};
pub use manager::{SlotInfo, UpdateManager};
pub use metadata::{FirmwareMetadata, SlotRecord};
pub use slot::Slot;

#[cfg(test)]
mod test;
