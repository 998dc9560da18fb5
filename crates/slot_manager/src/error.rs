use flash_driver::FlashError;
use thiserror_no_std::Error;

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    #[error("flash: {0}")]
    Flash(#[from] FlashError),
    #[error("metadata record failed validation")]
    InvalidMetadata,
    #[error("slot is not marked as holding a committed image")]
    SlotNotMarkedValid,
    #[error("image vector table does not point into RAM and flash")]
    InvalidVectorTable,
    #[error("dual-slot updates are disabled")]
    Disabled,
    #[error("operation not allowed on the running slot")]
    SlotActive,
    #[error("slot holds a committed image, erase it first")]
    SlotCommitted,
    #[error("range lies outside the slot")]
    OutOfBounds,
    #[error("flash contents differ from the bytes just written")]
    VerifyFailed,
    #[error("image checksum does not match")]
    CrcMismatch,
    #[error("flash layout regions overlap or are misaligned")]
    InvalidLayout,
}
