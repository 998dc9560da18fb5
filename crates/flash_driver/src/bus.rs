use crate::command::Command;

/// The controller that drives the flash device's command/address/data lines.
///
/// A controller has two mutually exclusive modes: discrete commands, and a
/// memory-mapped window where the device reads as linear memory. The driver
/// tracks which one is active and only calls `command*` in command mode.
pub trait QspiBus {
    type Error: core::fmt::Debug;

    /// Instruction (and optional address) frame with no data phase.
    fn command(&mut self, cmd: &Command) -> Result<(), Self::Error>;

    /// Instruction frame followed by a data phase read into `buf`.
    fn command_read(&mut self, cmd: &Command, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Instruction frame followed by `data` written to the device.
    fn command_write(&mut self, cmd: &Command, data: &[u8]) -> Result<(), Self::Error>;

    fn set_memory_mapped(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Read through the memory-mapped window. `offset` is relative to the
    /// start of the device, not to the window's CPU address.
    fn read_mapped(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    fn delay_us(&mut self, us: u32);
}
