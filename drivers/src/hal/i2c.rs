//! I2C capability interfaces.
//!
//! No backend implements these yet; the default provider reports
//! [`common::Error::NotSupported`] when asked for a controller.

use common::Result;

pub trait I2cDeviceProvider: Send + Sync {
    fn address(&self) -> u16;
    fn read(&self, buf: &mut [u8]) -> Result<()>;
    fn write(&self, buf: &[u8]) -> Result<()>;
    fn write_read(&self, write: &[u8], read: &mut [u8]) -> Result<()>;
}

pub trait I2cControllerProvider: Send + Sync {
    fn open(&self, address: u16) -> Result<Box<dyn I2cDeviceProvider>>;
    fn name(&self) -> Result<String>;
}
