//! Shared infrastructure for the low-level device drivers.
//!
//! - [`error`]: the error taxonomy every backend reports through
//! - [`sync`]: the descriptor multiplexer used to deliver pin interrupts

pub mod error;
pub mod sync;

pub use error::{Error, Result};
