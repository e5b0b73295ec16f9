//! Clock manager register block.

use bitflags::bitflags;
use core::mem::offset_of;

use super::{Peripheral, PeripheralKind};

bitflags! {
    /// Clock generator control bits.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ClockCtl: u32 {
        const ENAB = 1 << 4;
        const KILL = 1 << 5;
        const BUSY = 1 << 7;
        const FLIP = 1 << 8;
        const _ = !0;
    }
}

/// Pack a DIVI/DIVF pair into a divisor register value.
#[inline(always)]
pub const fn divisor(divi: u32, divf: u32) -> u32 {
    ((divi & 0xfff) << 12) | (divf & 0xfff)
}

/// One generator's control/divisor pair.
#[repr(C)]
pub struct ClockControl {
    pub ctl: u32,
    pub div: u32,
}

#[repr(C)]
pub struct ClockRegisters {
    _r0: [ClockControl; 14],
    /// GPCLK0..=2.
    pub gp: [ClockControl; 3],
    _hsm: ClockControl,
    _otp: ClockControl,
    pub pcm: ClockControl,
    pub pwm: ClockControl,
}

const _: () = assert!(offset_of!(ClockRegisters, gp) == 0x70);
const _: () = assert!(offset_of!(ClockRegisters, pcm) == 0x98);
const _: () = assert!(offset_of!(ClockRegisters, pwm) == 0xa0);

impl Peripheral for ClockRegisters {
    const KIND: PeripheralKind = PeripheralKind::ClockManager;
}
