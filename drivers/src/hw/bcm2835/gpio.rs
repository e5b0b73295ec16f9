//! GPIO controller register block.

use core::mem::offset_of;

use super::{Peripheral, PeripheralKind};

/// Number of pins exposed by the controller.
pub const PIN_COUNT: u32 = 54;

/// FSEL function codes.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Function {
    Input = 0b000,
    Output = 0b001,
    Alt0 = 0b100,
    Alt1 = 0b101,
    Alt2 = 0b110,
    Alt3 = 0b111,
    Alt4 = 0b011,
    Alt5 = 0b010,
}

impl Function {
    /// Alternate functions in ALT0..=ALT5 order.
    pub const ALT: [Function; 6] = [
        Function::Alt0,
        Function::Alt1,
        Function::Alt2,
        Function::Alt3,
        Function::Alt4,
        Function::Alt5,
    ];

    /// Decode a 3-bit FSEL field.
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0b000 => Function::Input,
            0b001 => Function::Output,
            0b100 => Function::Alt0,
            0b101 => Function::Alt1,
            0b110 => Function::Alt2,
            0b111 => Function::Alt3,
            0b011 => Function::Alt4,
            _ => Function::Alt5,
        }
    }
}

/// GPPUD codes used by the legacy pull sequence.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LegacyPull {
    Off = 0b00,
    Down = 0b01,
    Up = 0b10,
}

/// GPIO_PUP_PDN_CNTRL codes on BCM2711.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bcm2711Pull {
    Off = 0b00,
    Up = 0b01,
    Down = 0b10,
}

impl Bcm2711Pull {
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0b11 {
            0b00 => Some(Bcm2711Pull::Off),
            0b01 => Some(Bcm2711Pull::Up),
            0b10 => Some(Bcm2711Pull::Down),
            _ => None,
        }
    }
}

/// Memory-mapped register layout.
#[repr(C)]
pub struct GpioRegisters {
    pub gpfsel: [u32; 6],
    _r0: u32,
    pub gpset: [u32; 2],
    _r1: u32,
    pub gpclr: [u32; 2],
    _r2: u32,
    pub gplev: [u32; 2],
    _r3: u32,
    pub gpeds: [u32; 2],
    _r4: u32,
    pub gpren: [u32; 2],
    _r5: u32,
    pub gpfen: [u32; 2],
    _r6: u32,
    pub gphen: [u32; 2],
    _r7: u32,
    pub gplen: [u32; 2],
    _r8: u32,
    pub gparen: [u32; 2],
    _r9: u32,
    pub gpafen: [u32; 2],
    _r10: u32,
    pub gppud: u32,
    pub gppudclk: [u32; 2],
    _r11: [u32; 17],
    /// BCM2711 only.
    pub pup_pdn_cntrl: [u32; 4],
}

const _: () = assert!(offset_of!(GpioRegisters, gpset) == 0x1c);
const _: () = assert!(offset_of!(GpioRegisters, gplev) == 0x34);
const _: () = assert!(offset_of!(GpioRegisters, gpeds) == 0x40);
const _: () = assert!(offset_of!(GpioRegisters, gpren) == 0x4c);
const _: () = assert!(offset_of!(GpioRegisters, gpfen) == 0x58);
const _: () = assert!(offset_of!(GpioRegisters, gppud) == 0x94);
const _: () = assert!(offset_of!(GpioRegisters, gppudclk) == 0x98);
const _: () = assert!(offset_of!(GpioRegisters, pup_pdn_cntrl) == 0xe4);

impl Peripheral for GpioRegisters {
    const KIND: PeripheralKind = PeripheralKind::Gpio;
}

/// Register index and bit for pin-per-bit banks.
#[inline(always)]
pub const fn bank_bit(pin: u32) -> (usize, u32) {
    ((pin / 32) as usize, 1 << (pin % 32))
}

/// Register index and shift of the FSEL field for `pin`.
#[inline(always)]
pub const fn fsel_field(pin: u32) -> (usize, u32) {
    ((pin / 10) as usize, 3 * (pin % 10))
}

/// Register index and shift of the BCM2711 pull field for `pin`.
#[inline(always)]
pub const fn pull_field(pin: u32) -> (usize, u32) {
    ((pin / 16) as usize, 2 * (pin % 16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fsel_field_covers_every_bank() {
        assert_eq!(fsel_field(0), (0, 0));
        assert_eq!(fsel_field(9), (0, 27));
        assert_eq!(fsel_field(18), (1, 24));
        assert_eq!(fsel_field(53), (5, 9));
    }

    #[test]
    fn function_codes_decode() {
        for f in Function::ALT {
            assert_eq!(Function::from_bits(f as u32), f);
        }
        assert_eq!(Function::from_bits(0b001), Function::Output);
    }
}
