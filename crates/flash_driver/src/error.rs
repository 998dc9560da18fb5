use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};
use thiserror_no_std::Error;

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    #[error("write enable latch was not set")]
    WriteEnableFailed,
    #[error("device stayed busy past its timeout")]
    Timeout,
    #[error("address is out of range or not aligned to the operation")]
    InvalidAddress,
    #[error("length exceeds the page, the buffer or the device")]
    InvalidLength,
    #[error("bus command or data phase failed")]
    TransmitFailed,
    #[error("flash identification does not match the configured part")]
    DeviceMismatch,
    #[error("no blob stored at this address")]
    NotFound,
    #[error("erase or program requested while memory mapped")]
    MappedMode,
    #[error("driver used before init")]
    NotInitialized,
}

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlashError::InvalidAddress => NorFlashErrorKind::NotAligned,
            FlashError::InvalidLength => NorFlashErrorKind::OutOfBounds,
            _ => NorFlashErrorKind::Other,
        }
    }
}

impl From<NorFlashErrorKind> for FlashError {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => FlashError::InvalidAddress,
            NorFlashErrorKind::OutOfBounds => FlashError::InvalidLength,
            _ => FlashError::TransmitFailed,
        }
    }
}
