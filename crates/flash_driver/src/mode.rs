use core::ops::{Deref, DerefMut};

use crate::bus::QspiBus;
use crate::driver::FlashDriver;
use crate::error::FlashError;

/// Holds the driver in command mode and puts it back into memory-mapped mode
/// on drop if that is where it was found.
pub struct CommandMode<'a, B: QspiBus> {
    driver: &'a mut FlashDriver<B>,
    restore_mapped: bool,
}

impl<B: QspiBus> FlashDriver<B> {
    pub fn command_mode(&mut self) -> Result<CommandMode<'_, B>, FlashError> {
        let restore_mapped = self.is_mapped();
        self.exit_mapped_mode()?;
        Ok(CommandMode {
            driver: self,
            restore_mapped,
        })
    }
}

impl<B: QspiBus> CommandMode<'_, B> {
    pub fn was_mapped(&self) -> bool {
        self.restore_mapped
    }

    /// Leave command mode, reporting a failure to re-enter mapped mode.
    ///
    /// Success paths end with this; dropping the guard on an error path
    /// restores mapped mode too but can only log a failure.
    pub fn finish(mut self) -> Result<(), FlashError> {
        if core::mem::take(&mut self.restore_mapped) {
            self.driver.enter_mapped_mode()?;
        }
        Ok(())
    }
}

impl<B: QspiBus> Deref for CommandMode<'_, B> {
    type Target = FlashDriver<B>;

    fn deref(&self) -> &Self::Target {
        self.driver
    }
}

impl<B: QspiBus> DerefMut for CommandMode<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.driver
    }
}

impl<B: QspiBus> Drop for CommandMode<'_, B> {
    fn drop(&mut self) {
        if self.restore_mapped {
            if let Err(_e) = self.driver.enter_mapped_mode() {
                error!("flash: could not restore mapped mode");
            }
        }
    }
}
