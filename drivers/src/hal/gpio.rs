//! GPIO (General Purpose Input/Output) Hardware Abstraction Layer.
//!
//! This module defines backend-independent traits for GPIO control. A
//! [`GpioProvider`] enumerates controllers, a [`GpioControllerProvider`]
//! opens pins, and a [`GpioPinProvider`] drives one pin.

use std::sync::Arc;

use common::{Error, Result};

/// Pin logic level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinValue {
    /// Logic low (0V or ground).
    Low,
    /// Logic high (3.3V).
    High,
}

impl From<bool> for PinValue {
    fn from(value: bool) -> Self {
        if value {
            PinValue::High
        } else {
            PinValue::Low
        }
    }
}

impl From<PinValue> for bool {
    fn from(value: PinValue) -> bool {
        matches!(value, PinValue::High)
    }
}

/// How a pin is driven.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinDriveMode {
    /// Input, no pull resistor.
    Input,
    /// Input with the internal pull-up enabled.
    InputPullUp,
    /// Input with the internal pull-down enabled.
    InputPullDown,
    /// Push-pull output.
    Output,
    OpenDrain,
    OpenSource,
    /// Routed to a PWM channel.
    Pwm,
    /// Routed to a general purpose clock.
    Clock,
    /// Routed to some other alternate function.
    AlternateFunction,
}

impl PinDriveMode {
    pub const fn is_input(self) -> bool {
        matches!(
            self,
            PinDriveMode::Input | PinDriveMode::InputPullUp | PinDriveMode::InputPullDown
        )
    }
}

/// Edge selection for pin interrupts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinEdge {
    /// No edge detection; disables the interrupt.
    None,
    /// Detect rising edge (low-to-high transition).
    Rising,
    /// Detect falling edge (high-to-low transition).
    Falling,
    /// Detect both rising and falling edges.
    Both,
}

/// Pad drive strength, programmed per bank.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinDriveStrength {
    Ma2 = 0,
    Ma4 = 1,
    Ma6 = 2,
    Ma8 = 3,
    Ma10 = 4,
    Ma12 = 5,
    Ma14 = 6,
    Ma16 = 7,
}

impl PinDriveStrength {
    /// Decode the 3-bit DRIVE field.
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0 => PinDriveStrength::Ma2,
            1 => PinDriveStrength::Ma4,
            2 => PinDriveStrength::Ma6,
            3 => PinDriveStrength::Ma8,
            4 => PinDriveStrength::Ma10,
            5 => PinDriveStrength::Ma12,
            6 => PinDriveStrength::Ma14,
            _ => PinDriveStrength::Ma16,
        }
    }

    pub const fn milliamps(self) -> u32 {
        2 + 2 * self as u32
    }
}

/// Interrupt service routine, run on the backend's event thread.
pub type Isr = Arc<dyn Fn(PinEdge) + Send + Sync>;

/// How a controller reaches the hardware.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Memory-mapped peripheral registers.
    DirectRegister,
    /// The kernel GPIO character device.
    CharacterDevice,
    /// The legacy sysfs pseudo-files.
    LegacyFile,
}

/// One opened pin.
///
/// Dropping the provider releases the pin: any interrupt is detached first,
/// then the backend state is torn down.
pub trait GpioPinProvider: Send + Sync {
    fn pin_number(&self) -> u32;

    fn read(&self) -> Result<PinValue>;

    fn write(&self, value: PinValue) -> Result<()>;

    fn drive_mode(&self) -> Result<PinDriveMode>;

    fn set_drive_mode(&self, mode: PinDriveMode) -> Result<()>;

    /// Run `isr` on every `edge`. [`PinEdge::None`] or a missing `isr`
    /// detaches the current routine.
    fn enable_interrupt(&self, edge: PinEdge, isr: Option<Isr>) -> Result<()>;
}

/// One GPIO controller and its pin index space.
pub trait GpioControllerProvider: Send + Sync {
    /// Open pin `pin`, which must lie in `base..base + count`.
    fn open(&self, pin: u32) -> Result<Box<dyn GpioPinProvider>>;

    /// Identifies the hardware behind this controller. Two providers with
    /// the same key drive the same pins.
    fn key(&self) -> String;

    fn base(&self) -> Result<u32>;

    fn count(&self) -> Result<u32>;

    fn name(&self) -> Result<String>;

    fn backend(&self) -> Backend;

    fn drive_strength(&self, _bank: u32) -> Result<PinDriveStrength> {
        Err(Error::NotSupported)
    }

    fn set_drive_strength(&self, _bank: u32, _strength: PinDriveStrength) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn hysteresis(&self, _bank: u32) -> Result<bool> {
        Err(Error::NotSupported)
    }

    fn set_hysteresis(&self, _bank: u32, _enabled: bool) -> Result<()> {
        Err(Error::NotSupported)
    }
}

/// Enumerates the GPIO controllers of one backend.
pub trait GpioProvider: Send + Sync {
    /// Every controller that could be constructed. Candidates that fail are
    /// skipped.
    fn controllers(&self) -> Vec<Box<dyn GpioControllerProvider>>;

    fn controllers_named(&self, name: &str) -> Vec<Box<dyn GpioControllerProvider>> {
        self.controllers()
            .into_iter()
            .filter(|c| c.name().is_ok_and(|n| n == name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_strength_spans_two_to_sixteen_milliamps() {
        assert_eq!(PinDriveStrength::from_bits(0).milliamps(), 2);
        assert_eq!(PinDriveStrength::from_bits(3).milliamps(), 8);
        assert_eq!(PinDriveStrength::from_bits(0xf).milliamps(), 16);
    }

    #[test]
    fn input_modes() {
        assert!(PinDriveMode::InputPullDown.is_input());
        assert!(!PinDriveMode::OpenDrain.is_input());
    }
}
