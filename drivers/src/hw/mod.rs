//! Register layouts.
//!
//! Plain `#[repr(C)]` descriptions of the peripheral register blocks and
//! their bit fields. Nothing here touches memory; see
//! [`crate::platform::bcm2835::PeripheralMap`] for how the blocks are reached.

pub mod bcm2835;
