//! GPIO character device uAPI (v2) structures and ioctl requests.
//!
//! Layouts mirror `<linux/gpio.h>`; sizes are asserted at compile time.

use bitflags::bitflags;
use core::mem::size_of;

pub const GPIO_MAX_NAME_SIZE: usize = 32;
pub const GPIO_V2_LINES_MAX: usize = 64;
pub const GPIO_V2_LINE_NUM_ATTRS_MAX: usize = 10;

pub const GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES: u32 = 2;

pub const GPIO_V2_LINE_EVENT_RISING_EDGE: u32 = 1;
pub const GPIO_V2_LINE_EVENT_FALLING_EDGE: u32 = 2;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct LineFlags: u64 {
        const USED = 1 << 0;
        const ACTIVE_LOW = 1 << 1;
        const INPUT = 1 << 2;
        const OUTPUT = 1 << 3;
        const EDGE_RISING = 1 << 4;
        const EDGE_FALLING = 1 << 5;
        const OPEN_DRAIN = 1 << 6;
        const OPEN_SOURCE = 1 << 7;
        const BIAS_PULL_UP = 1 << 8;
        const BIAS_PULL_DOWN = 1 << 9;
        const BIAS_DISABLED = 1 << 10;
        const EVENT_CLOCK_REALTIME = 1 << 11;
        const EVENT_CLOCK_HTE = 1 << 12;
        const _ = !0;
    }
}

/// `struct gpiochip_info`
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct ChipInfo {
    pub name: [u8; GPIO_MAX_NAME_SIZE],
    pub label: [u8; GPIO_MAX_NAME_SIZE],
    pub lines: u32,
}

/// `struct gpio_v2_line_attribute`. The trailing union is carried as `u64`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct LineAttribute {
    pub id: u32,
    pub padding: u32,
    pub value: u64,
}

/// `struct gpio_v2_line_config_attribute`
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct LineConfigAttribute {
    pub attr: LineAttribute,
    pub mask: u64,
}

/// `struct gpio_v2_line_config`
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct LineConfig {
    pub flags: u64,
    pub num_attrs: u32,
    pub padding: [u32; 5],
    pub attrs: [LineConfigAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
}

impl LineConfig {
    pub fn new(flags: LineFlags) -> Self {
        Self {
            flags: flags.bits(),
            ..Self::default()
        }
    }

    /// Add an initial output value for the first requested line.
    pub fn with_output_value(mut self, high: bool) -> Self {
        let slot = self.num_attrs as usize;
        self.attrs[slot] = LineConfigAttribute {
            attr: LineAttribute {
                id: GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES,
                padding: 0,
                value: u64::from(high),
            },
            mask: 1,
        };
        self.num_attrs += 1;
        self
    }
}

/// `struct gpio_v2_line_request`
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct LineRequest {
    pub offsets: [u32; GPIO_V2_LINES_MAX],
    pub consumer: [u8; GPIO_MAX_NAME_SIZE],
    pub config: LineConfig,
    pub num_lines: u32,
    pub event_buffer_size: u32,
    pub padding: [u32; 5],
    pub fd: i32,
}

impl LineRequest {
    /// Request a single line.
    pub fn single(offset: u32, consumer: &str, config: LineConfig) -> Self {
        let mut request = Self {
            offsets: [0; GPIO_V2_LINES_MAX],
            consumer: [0; GPIO_MAX_NAME_SIZE],
            config,
            num_lines: 1,
            event_buffer_size: 0,
            padding: [0; 5],
            fd: -1,
        };
        request.offsets[0] = offset;
        let len = consumer.len().min(GPIO_MAX_NAME_SIZE - 1);
        request.consumer[..len].copy_from_slice(&consumer.as_bytes()[..len]);
        request
    }
}

/// `struct gpio_v2_line_info`
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct LineInfo {
    pub name: [u8; GPIO_MAX_NAME_SIZE],
    pub consumer: [u8; GPIO_MAX_NAME_SIZE],
    pub offset: u32,
    pub num_attrs: u32,
    pub flags: u64,
    pub attrs: [LineAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
    pub padding: [u32; 4],
}

impl LineInfo {
    pub fn for_offset(offset: u32) -> Self {
        Self {
            name: [0; GPIO_MAX_NAME_SIZE],
            consumer: [0; GPIO_MAX_NAME_SIZE],
            offset,
            num_attrs: 0,
            flags: 0,
            attrs: [LineAttribute::default(); GPIO_V2_LINE_NUM_ATTRS_MAX],
            padding: [0; 4],
        }
    }

    pub fn flags(&self) -> LineFlags {
        LineFlags::from_bits_retain(self.flags)
    }
}

/// `struct gpio_v2_line_values`
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct LineValues {
    pub bits: u64,
    pub mask: u64,
}

/// `struct gpio_v2_line_event`
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct LineEvent {
    pub timestamp_ns: u64,
    pub id: u32,
    pub offset: u32,
    pub seqno: u32,
    pub line_seqno: u32,
    pub padding: [u32; 6],
}

impl LineEvent {
    /// Decode one record as read from a line descriptor.
    pub fn from_bytes(bytes: &[u8; size_of::<LineEvent>()]) -> Self {
        let u32_at = |at: usize| u32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[..8]);
        Self {
            timestamp_ns: u64::from_ne_bytes(timestamp),
            id: u32_at(8),
            offset: u32_at(12),
            seqno: u32_at(16),
            line_seqno: u32_at(20),
            padding: [0; 6],
        }
    }
}

const _: () = assert!(size_of::<ChipInfo>() == 68);
const _: () = assert!(size_of::<LineAttribute>() == 16);
const _: () = assert!(size_of::<LineConfigAttribute>() == 24);
const _: () = assert!(size_of::<LineConfig>() == 272);
const _: () = assert!(size_of::<LineRequest>() == 592);
const _: () = assert!(size_of::<LineInfo>() == 256);
const _: () = assert!(size_of::<LineValues>() == 16);
const _: () = assert!(size_of::<LineEvent>() == 48);

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;
const GPIO_IOC_MAGIC: u32 = 0xB4;

const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | (GPIO_IOC_MAGIC << 8) | nr
}

pub const GPIO_GET_CHIPINFO_IOCTL: u32 = ioc(IOC_READ, 0x01, size_of::<ChipInfo>());
pub const GPIO_V2_GET_LINEINFO_IOCTL: u32 = ioc(IOC_READ | IOC_WRITE, 0x05, size_of::<LineInfo>());
pub const GPIO_V2_GET_LINE_IOCTL: u32 = ioc(IOC_READ | IOC_WRITE, 0x07, size_of::<LineRequest>());
pub const GPIO_V2_LINE_SET_CONFIG_IOCTL: u32 = ioc(IOC_READ | IOC_WRITE, 0x0D, size_of::<LineConfig>());
pub const GPIO_V2_LINE_GET_VALUES_IOCTL: u32 = ioc(IOC_READ | IOC_WRITE, 0x0E, size_of::<LineValues>());
pub const GPIO_V2_LINE_SET_VALUES_IOCTL: u32 = ioc(IOC_READ | IOC_WRITE, 0x0F, size_of::<LineValues>());

/// Interpret a fixed-size, NUL-padded name field.
pub fn name_from(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
