//! DMA controller register block.

use core::mem::{offset_of, size_of};

use super::{Peripheral, PeripheralKind};

#[repr(C)]
pub struct DmaChannelRegisters {
    pub cs: u32,
    pub conblk_ad: u32,
    pub ti: u32,
    pub source_ad: u32,
    pub dest_ad: u32,
    pub txfr_len: u32,
    pub stride: u32,
    pub nextconbk: u32,
    pub debug: u32,
    _r: [u32; 55],
}

const _: () = assert!(size_of::<DmaChannelRegisters>() == 0x100);

#[repr(C)]
pub struct DmaRegisters {
    pub channel: [DmaChannelRegisters; 15],
    _r0: [u32; 56],
    pub int_status: u32,
    _r1: [u32; 3],
    pub enable: u32,
}

const _: () = assert!(offset_of!(DmaRegisters, int_status) == 0xfe0);
const _: () = assert!(offset_of!(DmaRegisters, enable) == 0xff0);

impl Peripheral for DmaRegisters {
    const KIND: PeripheralKind = PeripheralKind::Dma;
}
