//! Application-facing handles.
//!
//! A controller wraps one backend controller. Opening a pin or channel
//! hands out an `Arc` handle; at most one handle per pin of the same
//! hardware is alive at any time.

pub mod access;
pub mod gpio;
pub mod pwm;

pub use access::{AccessRegistry, Slot};
pub use gpio::{GpioController, GpioPin};
pub use pwm::{PwmChannel, PwmController};
