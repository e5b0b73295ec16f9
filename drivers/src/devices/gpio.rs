//! GPIO controllers and pins.

use std::sync::Arc;

use common::Result;

use super::{AccessRegistry, Slot};
use crate::device_manager;
use crate::hal::gpio::{
    Backend, GpioControllerProvider, GpioPinProvider, GpioProvider, Isr, PinDriveMode,
    PinDriveStrength, PinEdge, PinValue,
};

static PINS: AccessRegistry = AccessRegistry::new();

/// An opened pin. Dropping the last reference releases it.
pub struct GpioPin {
    provider: Box<dyn GpioPinProvider>,
    /// Released after `provider` has been torn down.
    _slot: Slot,
}

impl GpioPin {
    pub fn pin_number(&self) -> u32 {
        self.provider.pin_number()
    }

    pub fn read(&self) -> Result<PinValue> {
        self.provider.read()
    }

    pub fn write(&self, value: PinValue) -> Result<()> {
        self.provider.write(value)
    }

    pub fn drive_mode(&self) -> Result<PinDriveMode> {
        self.provider.drive_mode()
    }

    pub fn set_drive_mode(&self, mode: PinDriveMode) -> Result<()> {
        self.provider.set_drive_mode(mode)
    }

    /// Call `callback` with this pin's number on every `edge`.
    ///
    /// The callback runs on the backend's event thread. Passing
    /// [`PinEdge::None`] detaches it.
    pub fn enable_interrupt<F>(&self, edge: PinEdge, callback: F) -> Result<()>
    where
        F: Fn(u32, PinEdge) + Send + Sync + 'static,
    {
        let pin = self.pin_number();
        let isr: Isr = Arc::new(move |edge| callback(pin, edge));
        self.provider.enable_interrupt(edge, Some(isr))
    }

    pub fn disable_interrupt(&self) -> Result<()> {
        self.provider.enable_interrupt(PinEdge::None, None)
    }
}

impl Drop for GpioPin {
    fn drop(&mut self) {
        if let Err(err) = self.disable_interrupt() {
            log::warn!("pin {}: failed to detach interrupt: {err}", self.pin_number());
        }
    }
}

/// One GPIO controller.
pub struct GpioController {
    provider: Box<dyn GpioControllerProvider>,
}

impl GpioController {
    pub fn new(provider: Box<dyn GpioControllerProvider>) -> Self {
        Self { provider }
    }

    /// The controller chosen by the process-wide default provider.
    pub fn system_default() -> Result<Self> {
        device_manager::default_provider().gpio_controller().map(Self::new)
    }

    /// Open `pin`, failing with [`common::Error::AccessViolation`] while
    /// another handle to it is alive.
    pub fn open(&self, pin: u32) -> Result<Arc<GpioPin>> {
        let key = self.provider.key();
        let slot = PINS.claim(&key, pin)?;
        let provider = self.provider.open(pin)?;
        log::debug!("opened pin {pin} on {key}");
        Ok(Arc::new(GpioPin {
            provider,
            _slot: slot,
        }))
    }

    pub fn try_open(&self, pin: u32) -> Option<Arc<GpioPin>> {
        self.open(pin).ok()
    }

    pub fn key(&self) -> String {
        self.provider.key()
    }

    pub fn base(&self) -> Result<u32> {
        self.provider.base()
    }

    pub fn count(&self) -> Result<u32> {
        self.provider.count()
    }

    pub fn name(&self) -> Result<String> {
        self.provider.name()
    }

    pub fn backend(&self) -> Backend {
        self.provider.backend()
    }

    pub fn drive_strength(&self, bank: u32) -> Result<PinDriveStrength> {
        self.provider.drive_strength(bank)
    }

    pub fn set_drive_strength(&self, bank: u32, strength: PinDriveStrength) -> Result<()> {
        self.provider.set_drive_strength(bank, strength)
    }

    pub fn hysteresis(&self, bank: u32) -> Result<bool> {
        self.provider.hysteresis(bank)
    }

    pub fn set_hysteresis(&self, bank: u32, enabled: bool) -> Result<()> {
        self.provider.set_hysteresis(bank, enabled)
    }
}

/// Every controller `provider` can construct.
pub fn controllers(provider: &dyn GpioProvider) -> Vec<GpioController> {
    provider.controllers().into_iter().map(GpioController::new).collect()
}

/// The controllers of `provider` matching `name`.
pub fn controllers_named(provider: &dyn GpioProvider, name: &str) -> Vec<GpioController> {
    provider
        .controllers_named(name)
        .into_iter()
        .map(GpioController::new)
        .collect()
}
