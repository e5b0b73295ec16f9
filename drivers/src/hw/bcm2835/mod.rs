//! Raw register layouts of the BCM2835 family peripherals.
//!
//! Every block is a `#[repr(C)]` struct whose field offsets match the
//! datasheet. Key offsets are pinned with compile-time assertions so a
//! layout mistake fails the build instead of poking the wrong register.
//!
//! These types are never constructed; they are only ever reached through a
//! pointer handed out by the peripheral map and accessed with volatile
//! reads and writes.

pub mod a2w;
pub mod clock;
pub mod dma;
pub mod gpio;
pub mod pcm;
pub mod power;
pub mod pwm;

/// Password every clock manager and power management write must carry.
pub const PASSWORD: u32 = 0x5A00_0000;

/// Peripheral blocks reachable through the peripheral map.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeripheralKind {
    Dma,
    PowerManagement,
    ClockManager,
    A2w,
    Gpio,
    Pcm,
    Pwm,
}

impl PeripheralKind {
    /// Offset of instance 0 from the peripheral base.
    pub const fn offset(self) -> usize {
        match self {
            PeripheralKind::Dma => 0x0000_7000,
            PeripheralKind::PowerManagement => 0x0010_0000,
            PeripheralKind::ClockManager => 0x0010_1000,
            PeripheralKind::A2w => 0x0010_2000,
            PeripheralKind::Gpio => 0x0020_0000,
            PeripheralKind::Pcm => 0x0020_3000,
            PeripheralKind::Pwm => 0x0020_C000,
        }
    }

    /// Distance between consecutive instances.
    pub const fn stride(self) -> usize {
        match self {
            PeripheralKind::Pwm => 0x800,
            _ => 0,
        }
    }

    /// Number of instances the map can hand out.
    pub const fn instances(self) -> usize {
        match self {
            PeripheralKind::Pwm => 2,
            _ => 1,
        }
    }
}

/// A register block the peripheral map knows how to locate.
pub trait Peripheral: Sized + 'static {
    const KIND: PeripheralKind;
}
