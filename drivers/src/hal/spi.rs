//! SPI capability interfaces.
//!
//! No backend implements these yet; the default provider reports
//! [`common::Error::NotSupported`] when asked for a controller.

use common::Result;

/// Clock polarity and phase.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpiMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

pub trait SpiDeviceProvider: Send + Sync {
    fn transfer(&self, write: &[u8], read: &mut [u8]) -> Result<()>;
    fn set_mode(&self, mode: SpiMode) -> Result<()>;
    fn set_clock_frequency(&self, hz: u32) -> Result<()>;
}

pub trait SpiControllerProvider: Send + Sync {
    fn open(&self, chip_select: u32) -> Result<Box<dyn SpiDeviceProvider>>;
    fn name(&self) -> Result<String>;
}
