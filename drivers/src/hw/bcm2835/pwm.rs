//! PWM controller register block.

use bitflags::bitflags;
use core::mem::offset_of;

use super::{Peripheral, PeripheralKind};

/// Channels per controller.
pub const CHANNELS: u32 = 2;

bitflags! {
    /// CTL bits of channel 0. Channel `n` uses the same bits shifted by `8 * n`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PwmCtl: u32 {
        const PWEN = 1 << 0;
        const MODE = 1 << 1;
        const RPTL = 1 << 2;
        const SBIT = 1 << 3;
        const POLA = 1 << 4;
        const USEF = 1 << 5;
        const CLRF = 1 << 6;
        const MSEN = 1 << 7;
        const _ = !0;
    }
}

impl PwmCtl {
    /// These flags moved to `channel`'s byte of CTL.
    pub const fn for_channel(self, channel: u32) -> u32 {
        self.bits() << (8 * channel)
    }
}

/// STA bit reporting that `channel` is transmitting.
pub const fn sta_running(channel: u32) -> u32 {
    1 << (9 + channel)
}

#[repr(C)]
pub struct PwmChannelRegisters {
    pub rng: u32,
    pub dat: u32,
    pub fif: u32,
    _r: u32,
}

#[repr(C)]
pub struct PwmRegisters {
    pub ctl: u32,
    pub sta: u32,
    pub dmac: u32,
    _r0: u32,
    pub channel: [PwmChannelRegisters; 2],
}

const _: () = assert!(offset_of!(PwmRegisters, ctl) == 0x0);
const _: () = assert!(offset_of!(PwmRegisters, channel) == 0x10);
const _: () = assert!(offset_of!(PwmRegisters, channel) + core::mem::size_of::<PwmChannelRegisters>() == 0x20);

impl Peripheral for PwmRegisters {
    const KIND: PeripheralKind = PeripheralKind::Pwm;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_one_bits_live_in_second_byte() {
        assert_eq!((PwmCtl::PWEN | PwmCtl::MSEN).for_channel(1), 0x8100);
        assert_eq!(PwmCtl::POLA.for_channel(1), 1 << 12);
        assert_eq!(sta_running(1), 1 << 10);
    }
}
