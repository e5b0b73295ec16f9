//! Analog-to-wire block holding the PLL configuration.
//!
//! Per-PLL arrays are indexed A, C, D, H. Each register sits in its own
//! 32-byte slot.

use core::mem::offset_of;

use super::{Peripheral, PeripheralKind};

pub const PLL_CTRL_NDIV_MASK: u32 = 0x3ff;
pub const PLL_CTRL_PDIV_SHIFT: u32 = 12;
pub const PLL_CTRL_PDIV_MASK: u32 = 0x7 << PLL_CTRL_PDIV_SHIFT;
pub const PLL_FRAC_MASK: u32 = 0x000f_ffff;
pub const PLL_FRAC_BITS: u32 = 20;
pub const PLL_CDIV_MASK: u32 = 0xff;

pub const XOSC_CTRL_PLLCEN: u32 = 1 << 0;
pub const XOSC_CTRL_PLLHEN: u32 = 1 << 1;
pub const XOSC_CTRL_PLLDEN: u32 = 1 << 5;
pub const XOSC_CTRL_PLLAEN: u32 = 1 << 6;

#[repr(C)]
pub struct PllRegister {
    pub val: u32,
    _r: [u32; 7],
}

#[repr(C)]
pub struct A2wRegisters {
    _r0: [u32; 0x40],
    pub pll_ctrl: [PllRegister; 4],
    _r1: [u32; 4],
    pub xosc_ctrl: u32,
    _r2: [u32; 0x13],
    pub pllb_ctrl: PllRegister,
    pub pll_frac: [PllRegister; 4],
    _r3: [u32; 0x18],
    pub pllb_frac: u32,
    _r4: [u32; 0x1f],
    pub pllh_aux: u32,
    _r5: [u32; 0x67],
    /// Only A, C and D have a PER channel.
    pub pll_per: [PllRegister; 3],
}

const _: () = assert!(offset_of!(A2wRegisters, pll_ctrl) == 0x100);
const _: () = assert!(offset_of!(A2wRegisters, xosc_ctrl) == 0x190);
const _: () = assert!(offset_of!(A2wRegisters, pllb_ctrl) == 0x1e0);
const _: () = assert!(offset_of!(A2wRegisters, pll_frac) == 0x200);
const _: () = assert!(offset_of!(A2wRegisters, pllb_frac) == 0x2e0);
const _: () = assert!(offset_of!(A2wRegisters, pllh_aux) == 0x360);
const _: () = assert!(offset_of!(A2wRegisters, pll_per) == 0x500);

impl Peripheral for A2wRegisters {
    const KIND: PeripheralKind = PeripheralKind::A2w;
}
