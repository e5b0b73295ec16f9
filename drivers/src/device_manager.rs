//! Process-wide backend selection.
//!
//! The [`AggregateProvider`] in effect decides which backend answers
//! `GpioController::system_default()` and
//! `PwmController::system_default()`. The built-in [`DefaultProvider`] tries
//! the backends in order of capability; applications may install their own
//! with [`set_default_provider`].

use common::{Error, Result};

use crate::hal::gpio::{GpioControllerProvider, GpioProvider};
use crate::hal::i2c::I2cControllerProvider;
use crate::hal::pwm::{PwmControllerProvider, PwmProvider};
use crate::hal::spi::SpiControllerProvider;
use crate::platform::bcm2835::{Bcm2835GpioProvider, Bcm2835PwmProvider};
use crate::platform::sysfs::SysfsGpioProvider;

/// Hands out one controller per device class.
pub trait AggregateProvider: Send + Sync {
    fn gpio_controller(&self) -> Result<Box<dyn GpioControllerProvider>>;
    fn pwm_controller(&self) -> Result<Box<dyn PwmControllerProvider>>;
    fn spi_controller(&self) -> Result<Box<dyn SpiControllerProvider>>;
    fn i2c_controller(&self) -> Result<Box<dyn I2cControllerProvider>>;
}

static DIRECT_GPIO: spin::Lazy<Bcm2835GpioProvider> = spin::Lazy::new(Bcm2835GpioProvider::system);
static DIRECT_PWM: spin::Lazy<Bcm2835PwmProvider> = spin::Lazy::new(Bcm2835PwmProvider::system);
static SYSFS_GPIO: spin::Lazy<SysfsGpioProvider> = spin::Lazy::new(SysfsGpioProvider::new);

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        use crate::platform::cdev::CdevGpioProvider;

        static CDEV_GPIO: spin::Lazy<CdevGpioProvider> = spin::Lazy::new(CdevGpioProvider::new);

        fn character_device() -> Option<&'static dyn GpioProvider> {
            Some(&*CDEV_GPIO)
        }
    } else {
        fn character_device() -> Option<&'static dyn GpioProvider> {
            None
        }
    }
}

/// GPIO backends in the order they are tried.
fn gpio_backends() -> Vec<&'static dyn GpioProvider> {
    let mut backends: Vec<&'static dyn GpioProvider> = vec![&*DIRECT_GPIO];
    backends.extend(character_device());
    backends.push(&*SYSFS_GPIO);
    backends
}

/// Picks the first backend that can produce a controller: direct registers,
/// then the character device, then sysfs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProvider;

impl AggregateProvider for DefaultProvider {
    fn gpio_controller(&self) -> Result<Box<dyn GpioControllerProvider>> {
        for backend in gpio_backends() {
            if let Some(controller) = backend.controllers().into_iter().next() {
                log::debug!("default gpio controller: {}", controller.key());
                return Ok(controller);
            }
        }
        Err(Error::NoController)
    }

    fn pwm_controller(&self) -> Result<Box<dyn PwmControllerProvider>> {
        DIRECT_PWM
            .controllers()
            .into_iter()
            .next()
            .ok_or(Error::NoController)
    }

    fn spi_controller(&self) -> Result<Box<dyn SpiControllerProvider>> {
        Err(Error::NotSupported)
    }

    fn i2c_controller(&self) -> Result<Box<dyn I2cControllerProvider>> {
        Err(Error::NotSupported)
    }
}

static BUILTIN: DefaultProvider = DefaultProvider;
static CURRENT: spin::RwLock<&'static dyn AggregateProvider> = spin::RwLock::new(&BUILTIN);

/// The provider currently in effect.
pub fn default_provider() -> &'static dyn AggregateProvider {
    *CURRENT.read()
}

/// Install `provider` as the process default and return the previous one.
pub fn set_default_provider(
    provider: &'static dyn AggregateProvider,
) -> &'static dyn AggregateProvider {
    core::mem::replace(&mut *CURRENT.write(), provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{GpioController, PwmController};
    use crate::platform::PlatformInfo;
    use crate::platform::bcm2835::scratch_map;
    use serial_test::serial;

    struct Scratch;

    impl AggregateProvider for Scratch {
        fn gpio_controller(&self) -> Result<Box<dyn GpioControllerProvider>> {
            let map = scratch_map(PlatformInfo::new(0xfe00_0000, 0x0180_0000));
            Ok(Box::new(Bcm2835GpioProvider::new(map).controller()?))
        }

        fn pwm_controller(&self) -> Result<Box<dyn PwmControllerProvider>> {
            Err(Error::NoController)
        }

        fn spi_controller(&self) -> Result<Box<dyn SpiControllerProvider>> {
            Err(Error::NotSupported)
        }

        fn i2c_controller(&self) -> Result<Box<dyn I2cControllerProvider>> {
            Err(Error::NotSupported)
        }
    }

    static SCRATCH: Scratch = Scratch;

    #[test]
    #[serial]
    fn installed_provider_answers_default_lookups() {
        let previous = set_default_provider(&SCRATCH);

        let gpio = GpioController::system_default().unwrap();
        assert_eq!(gpio.key(), "bcm2835-gpio@0xfe200000");
        assert!(matches!(PwmController::system_default(), Err(Error::NoController)));

        set_default_provider(previous);
    }

    #[test]
    #[serial]
    fn builtin_has_no_bus_controllers() {
        assert!(matches!(BUILTIN.spi_controller(), Err(Error::NotSupported)));
        assert!(matches!(BUILTIN.i2c_controller(), Err(Error::NotSupported)));
    }

    #[test]
    fn backend_order() {
        let backends = gpio_backends();
        assert_eq!(backends.len(), if cfg!(target_os = "linux") { 3 } else { 2 });
    }
}
