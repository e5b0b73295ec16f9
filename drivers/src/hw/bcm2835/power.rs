//! Power management register block. Only the pad control part is modelled.

use core::mem::offset_of;

use super::{Peripheral, PeripheralKind};

/// Drive strength field of a PADS register.
pub const PADS_DRIVE_MASK: u32 = 0b111;
/// Input hysteresis enable.
pub const PADS_HYST: u32 = 1 << 3;

#[repr(C)]
pub struct PowerRegisters {
    pub gnric: u32,
    pub audio: u32,
    _r0: [u32; 4],
    pub status: u32,
    pub rstc: u32,
    pub rsts: u32,
    pub wdog: u32,
    pub pads0: u32,
    /// Pad banks 0..=2 for GPIO 0-27, 28-45 and 46-53.
    pub pads: [u32; 5],
}

const _: () = assert!(offset_of!(PowerRegisters, pads0) == 0x28);
const _: () = assert!(offset_of!(PowerRegisters, pads) == 0x2c);

impl Peripheral for PowerRegisters {
    const KIND: PeripheralKind = PeripheralKind::PowerManagement;
}
