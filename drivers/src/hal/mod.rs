//! Hardware Abstraction Layer (HAL) - Backend-Independent Traits
//!
//! This module defines the capability interfaces every backend implements.
//! Application code talks to the handle layer in [`crate::devices`], which
//! only ever sees these traits.
//!
//! # Design Principles
//!
//! - **Object safety**: providers are used as `Box<dyn ...>` so backends can
//!   be chosen at runtime
//! - **Shared handles**: every operation takes `&self`, backends keep their
//!   own interior state
//! - **No platform leakage**: traits must not reference backend types
//!
//! # Available Interfaces
//!
//! - [`gpio`]: General Purpose Input/Output control
//! - [`pwm`]: Pulse width modulation channels
//! - [`spi`]: Serial Peripheral Interface (not implemented by any backend)
//! - [`i2c`]: Inter-Integrated Circuit bus (not implemented by any backend)

pub mod gpio;
pub mod i2c;
pub mod pwm;
pub mod spi;
