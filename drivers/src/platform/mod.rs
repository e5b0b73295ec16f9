//! Platform Discovery and Backends
//!
//! The peripheral window of a Raspberry-Pi-class SoC moves between chip
//! generations. It is discovered at runtime from the device tree rather
//! than selected at build time, so one binary runs on every board.
//!
//! # Backends
//!
//! - [`bcm2835`]: direct register access through `/dev/mem`
//! - `cdev`: the GPIO character device (Linux only)
//! - [`sysfs`]: the legacy `/sys/class/gpio` interface

use std::fs;
use std::path::Path;

pub mod bcm2835;
pub mod sysfs;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod cdev;
    }
}

/// Device-tree blob describing the SoC bus ranges.
pub const DEVICE_TREE_RANGES: &str = "/proc/device-tree/soc/ranges";

/// Peripheral base assumed when discovery fails.
pub const DEFAULT_PERIPHERAL_BASE: u32 = 0x2000_0000;
/// Peripheral window size assumed when discovery fails.
pub const DEFAULT_PERIPHERAL_SIZE: u32 = 0x0100_0000;

const BCM2711_PERIPHERAL_BASE: u32 = 0xFE00_0000;

/// SoC family, as far as register programming is concerned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SocGeneration {
    /// BCM2835, BCM2836 and BCM2837.
    Legacy,
    /// BCM2711 (Raspberry Pi 4).
    Bcm2711,
}

/// Physical location of the peripheral window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    base: u32,
    size: u32,
}

impl PlatformInfo {
    pub const fn new(base: u32, size: u32) -> Self {
        Self { base, size }
    }

    /// Parse a device-tree `ranges` blob.
    ///
    /// The child bus address is followed by the parent address and the
    /// size. On 64-bit parents the address takes two cells, which shows as
    /// a zero high cell at offset 4.
    pub fn from_ranges(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let blob = match fs::read(path) {
            Ok(blob) => blob,
            Err(err) => {
                log::debug!("{}: {err}, using default peripheral window", path.display());
                Vec::new()
            }
        };

        let first = cell(&blob, 4);
        let base = match first {
            Some(0) => cell(&blob, 8),
            other => other,
        };
        let size = match first {
            Some(0) => cell(&blob, 12),
            _ => cell(&blob, 8),
        };

        Self {
            base: base.unwrap_or(DEFAULT_PERIPHERAL_BASE),
            size: size.unwrap_or(DEFAULT_PERIPHERAL_SIZE),
        }
    }

    /// The running system's peripheral window, detected once per process.
    pub fn system() -> Self {
        static SYSTEM: spin::Once<PlatformInfo> = spin::Once::new();
        *SYSTEM.call_once(|| {
            let info = Self::from_ranges(DEVICE_TREE_RANGES);
            log::debug!(
                "peripheral window {:#010x}+{:#x} ({:?})",
                info.base,
                info.size,
                info.generation()
            );
            info
        })
    }

    pub const fn base(&self) -> u32 {
        self.base
    }

    pub const fn size(&self) -> u32 {
        self.size
    }

    pub const fn generation(&self) -> SocGeneration {
        if self.base == BCM2711_PERIPHERAL_BASE {
            SocGeneration::Bcm2711
        } else {
            SocGeneration::Legacy
        }
    }

    /// Frequency of the crystal every SoC clock is derived from.
    pub const fn crystal_hz(&self) -> u64 {
        match self.generation() {
            SocGeneration::Bcm2711 => 54_000_000,
            SocGeneration::Legacy => 19_200_000,
        }
    }
}

fn cell(blob: &[u8], offset: usize) -> Option<u32> {
    blob.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_be_bytes)
}
