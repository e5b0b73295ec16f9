//! Low-Level Device Drivers
//!
//! GPIO, PWM and clock access for Raspberry-Pi-class SoCs from user space,
//! over three interchangeable backends.
//!
//! # Module Organization
//!
//! - [`hal`]: Backend-independent capability traits
//! - [`hw`]: Register layouts of the SoC peripherals
//! - [`platform`]: Platform discovery and the backends (direct register,
//!   character device, sysfs)
//! - [`devices`]: Application-facing controllers and exclusive pin handles
//! - [`device_manager`]: Process-wide default backend selection
//!
//! # Design Principles
//!
//! 1. **Separation of Concerns**: Register layouts, backends and handles live in separate layers
//! 2. **Runtime Selection**: One binary runs on every chip generation and picks its backend by availability
//! 3. **Exclusive Ownership**: At most one live handle per physical pin or channel
//! 4. **Lazy Mapping**: Peripheral blocks are mapped on first use and kept for the process lifetime
//!
//! # Usage Example
//!
//! ```no_run
//! use drivers::devices::GpioController;
//! use drivers::hal::gpio::{PinDriveMode, PinEdge, PinValue};
//!
//! let controller = GpioController::system_default()?;
//! let led = controller.open(17)?;
//! led.set_drive_mode(PinDriveMode::Output)?;
//! led.write(PinValue::High)?;
//!
//! let button = controller.open(27)?;
//! button.set_drive_mode(PinDriveMode::InputPullUp)?;
//! button.enable_interrupt(PinEdge::Falling, |pin, edge| println!("{pin}: {edge:?}"))?;
//! # Ok::<(), drivers::Error>(())
//! ```

pub mod device_manager;
pub mod devices;
pub mod hal;
pub mod hw;
pub mod platform;

// Re-export commonly used types
pub use common::{Error, Result};
pub use device_manager::{AggregateProvider, DefaultProvider, default_provider, set_default_provider};
pub use devices::{GpioController, GpioPin, PwmChannel, PwmController};
pub use hal::gpio::{PinDriveMode, PinEdge, PinValue};
pub use platform::{PlatformInfo, SocGeneration};
