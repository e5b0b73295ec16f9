//! PCM / I2S register block.

use core::mem::offset_of;

use super::{Peripheral, PeripheralKind};

#[repr(C)]
pub struct PcmRegisters {
    pub cs: u32,
    pub fifo: u32,
    pub mode: u32,
    pub rxc: u32,
    pub txc: u32,
    pub dreq: u32,
    pub inten: u32,
    pub intstc: u32,
    pub gray: u32,
}

const _: () = assert!(offset_of!(PcmRegisters, gray) == 0x20);

impl Peripheral for PcmRegisters {
    const KIND: PeripheralKind = PeripheralKind::Pcm;
}
