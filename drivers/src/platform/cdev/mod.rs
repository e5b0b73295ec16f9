//! GPIO Character Device Backend
//!
//! Drives pins through the kernel's GPIO character device (`/dev/gpiochip*`,
//! uAPI v2). Each opened pin owns a line-request descriptor; edge events
//! arrive on that descriptor and are dispatched by one process-wide
//! [`Poller`].

pub mod uapi;

use std::fs::{self, File, OpenOptions};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::sync::Poller;
use common::{Error, Result};

use crate::hal::gpio::{
    Backend, GpioControllerProvider, GpioPinProvider, GpioProvider, Isr, PinDriveMode, PinEdge,
    PinValue,
};
use uapi::{
    ChipInfo, LineConfig, LineEvent, LineFlags, LineInfo, LineRequest, LineValues,
    GPIO_GET_CHIPINFO_IOCTL, GPIO_V2_GET_LINE_IOCTL, GPIO_V2_GET_LINEINFO_IOCTL,
    GPIO_V2_LINE_EVENT_FALLING_EDGE, GPIO_V2_LINE_GET_VALUES_IOCTL, GPIO_V2_LINE_SET_CONFIG_IOCTL,
    GPIO_V2_LINE_SET_VALUES_IOCTL,
};

/// Directory holding the chip device nodes.
pub const DEFAULT_DEVICE_ROOT: &str = "/dev";

/// Consumer label attached to every line request.
pub const CONSUMER: &str = "lowleveldevices";

const EVENT_SIZE: usize = size_of::<LineEvent>();

static EVENTS: spin::Lazy<Poller<Isr>> = spin::Lazy::new(|| Poller::new(drain_events));

fn ioctl<T>(fd: RawFd, request: u32, op: &'static str, arg: &mut T) -> Result<()> {
    // SAFETY: `arg` has the exact layout the request encodes.
    if unsafe { libc::ioctl(fd, request as _, arg as *mut T) } < 0 {
        return Err(Error::ioctl(fd, op));
    }
    Ok(())
}

/// Edge reported by one event record.
pub fn edge_of(event: &LineEvent) -> PinEdge {
    if event.id == GPIO_V2_LINE_EVENT_FALLING_EDGE {
        PinEdge::Falling
    } else {
        PinEdge::Rising
    }
}

fn readable(fd: RawFd) -> bool {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN | libc::POLLPRI,
        revents: 0,
    };
    unsafe { libc::poll(&mut pfd, 1, 0) > 0 }
}

/// Read every pending event record on `fd` and hand each edge to `isr`.
fn drain_events(fd: RawFd, isr: &Isr) {
    let mut record = [0u8; EVENT_SIZE];
    while readable(fd) {
        let n = unsafe { libc::read(fd, record.as_mut_ptr().cast(), EVENT_SIZE) };
        if n != EVENT_SIZE as isize {
            log::debug!("short event read on line {fd}: {n}");
            break;
        }
        isr(edge_of(&LineEvent::from_bytes(&record)));
    }
}

/// Enumerates the GPIO character devices under a device root.
#[derive(Debug, Clone)]
pub struct CdevGpioProvider {
    root: PathBuf,
}

impl CdevGpioProvider {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_DEVICE_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn chips(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut chips: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("gpiochip"))
            .map(|entry| entry.path())
            .collect();
        chips.sort();
        chips
    }
}

impl Default for CdevGpioProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioProvider for CdevGpioProvider {
    fn controllers(&self) -> Vec<Box<dyn GpioControllerProvider>> {
        self.chips()
            .into_iter()
            .filter_map(|path| match CdevGpioController::open_chip(&path) {
                Ok(controller) => Some(Box::new(controller) as Box<dyn GpioControllerProvider>),
                Err(err) => {
                    log::debug!("skipping {}: {err}", path.display());
                    None
                }
            })
            .collect()
    }

    /// Matches the device node name, e.g. `gpiochip0`.
    fn controllers_named(&self, name: &str) -> Vec<Box<dyn GpioControllerProvider>> {
        let path = self.root.join(name);
        match CdevGpioController::open_chip(&path) {
            Ok(controller) => vec![Box::new(controller)],
            Err(err) => {
                log::debug!("no chip {}: {err}", path.display());
                Vec::new()
            }
        }
    }
}

/// One `/dev/gpiochipN`.
#[derive(Debug)]
pub struct CdevGpioController {
    path: PathBuf,
    chip: Arc<File>,
}

impl CdevGpioController {
    pub fn open_chip(path: &Path) -> Result<Self> {
        let chip = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|err| Error::Access(format!("{}: {err}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            chip: Arc::new(chip),
        })
    }

    fn info(&self) -> Result<ChipInfo> {
        let mut info = ChipInfo {
            name: [0; uapi::GPIO_MAX_NAME_SIZE],
            label: [0; uapi::GPIO_MAX_NAME_SIZE],
            lines: 0,
        };
        ioctl(
            self.chip.as_raw_fd(),
            GPIO_GET_CHIPINFO_IOCTL,
            "GPIO_GET_CHIPINFO_IOCTL",
            &mut info,
        )?;
        Ok(info)
    }
}

fn line_info(chip: &File, offset: u32) -> Result<LineInfo> {
    let mut info = LineInfo::for_offset(offset);
    ioctl(
        chip.as_raw_fd(),
        GPIO_V2_GET_LINEINFO_IOCTL,
        "GPIO_V2_GET_LINEINFO_IOCTL",
        &mut info,
    )?;
    Ok(info)
}

impl GpioControllerProvider for CdevGpioController {
    fn open(&self, pin: u32) -> Result<Box<dyn GpioPinProvider>> {
        let count = self.count()?;
        if pin >= count {
            return Err(Error::invalid_argument(
                "CdevGpioController::open",
                format!("0 <= pin < {count}"),
                pin,
            ));
        }

        if line_info(&self.chip, pin)?.flags().contains(LineFlags::USED) {
            return Err(Error::AccessViolation);
        }

        let config = LineConfig::new(LineFlags::INPUT | LineFlags::BIAS_DISABLED);
        let mut request = LineRequest::single(pin, CONSUMER, config);
        ioctl(
            self.chip.as_raw_fd(),
            GPIO_V2_GET_LINE_IOCTL,
            "GPIO_V2_GET_LINE_IOCTL",
            &mut request,
        )?;
        // SAFETY: the kernel hands back a fresh descriptor we now own.
        let line = unsafe { OwnedFd::from_raw_fd(request.fd) };
        log::debug!("requested line {pin} of {} as fd {}", self.path.display(), request.fd);

        Ok(Box::new(CdevGpioPin {
            pin,
            chip: Arc::clone(&self.chip),
            line,
            edges: spin::Mutex::new(LineFlags::empty()),
        }))
    }

    fn key(&self) -> String {
        format!("gpiochip:{}", self.path.display())
    }

    fn base(&self) -> Result<u32> {
        Ok(0)
    }

    fn count(&self) -> Result<u32> {
        Ok(self.info()?.lines)
    }

    fn name(&self) -> Result<String> {
        Ok(uapi::name_from(&self.info()?.name))
    }

    fn backend(&self) -> Backend {
        Backend::CharacterDevice
    }
}

/// One requested line.
pub struct CdevGpioPin {
    pin: u32,
    chip: Arc<File>,
    line: OwnedFd,
    /// Edge flags currently configured; empty while no routine is attached.
    edges: spin::Mutex<LineFlags>,
}

impl CdevGpioPin {
    fn fd(&self) -> RawFd {
        self.line.as_raw_fd()
    }

    fn configure(&self, mut config: LineConfig) -> Result<()> {
        ioctl(
            self.fd(),
            GPIO_V2_LINE_SET_CONFIG_IOCTL,
            "GPIO_V2_LINE_SET_CONFIG_IOCTL",
            &mut config,
        )
    }

    fn input_flags(mode: PinDriveMode) -> Option<LineFlags> {
        match mode {
            PinDriveMode::Input => Some(LineFlags::INPUT | LineFlags::BIAS_DISABLED),
            PinDriveMode::InputPullUp => Some(LineFlags::INPUT | LineFlags::BIAS_PULL_UP),
            PinDriveMode::InputPullDown => Some(LineFlags::INPUT | LineFlags::BIAS_PULL_DOWN),
            _ => None,
        }
    }

    /// Route edge events on the line to `isr`. The line must already be
    /// configured for `edges`.
    fn attach(&self, edges: LineFlags, isr: Isr) -> Result<()> {
        EVENTS.add(self.fd(), libc::POLLIN | libc::POLLPRI, isr)?;
        *self.edges.lock() = edges;
        Ok(())
    }

    /// Stop routing edge events. Returns once no callback for the line runs.
    fn detach(&self) -> Result<()> {
        let mut edges = self.edges.lock();
        if edges.is_empty() {
            return Ok(());
        }
        *edges = LineFlags::empty();
        drop(edges);
        EVENTS.remove(self.fd())
    }
}

/// Translate line-info flags into a drive mode.
pub fn decode_drive_mode(flags: LineFlags) -> Result<PinDriveMode> {
    if flags.contains(LineFlags::INPUT) {
        if flags.contains(LineFlags::BIAS_PULL_UP) {
            Ok(PinDriveMode::InputPullUp)
        } else if flags.contains(LineFlags::BIAS_PULL_DOWN) {
            Ok(PinDriveMode::InputPullDown)
        } else {
            Ok(PinDriveMode::Input)
        }
    } else if flags.contains(LineFlags::OPEN_DRAIN) {
        Ok(PinDriveMode::OpenDrain)
    } else if flags.contains(LineFlags::OPEN_SOURCE) {
        Ok(PinDriveMode::OpenSource)
    } else if flags.contains(LineFlags::OUTPUT) {
        Ok(PinDriveMode::Output)
    } else {
        Err(Error::NotSupported)
    }
}

impl GpioPinProvider for CdevGpioPin {
    fn pin_number(&self) -> u32 {
        self.pin
    }

    fn read(&self) -> Result<PinValue> {
        let mut values = LineValues { bits: 0, mask: 1 };
        ioctl(
            self.fd(),
            GPIO_V2_LINE_GET_VALUES_IOCTL,
            "GPIO_V2_LINE_GET_VALUES_IOCTL",
            &mut values,
        )?;
        Ok(PinValue::from(values.bits & 1 != 0))
    }

    fn write(&self, value: PinValue) -> Result<()> {
        let mut values = LineValues {
            bits: u64::from(bool::from(value)),
            mask: 1,
        };
        ioctl(
            self.fd(),
            GPIO_V2_LINE_SET_VALUES_IOCTL,
            "GPIO_V2_LINE_SET_VALUES_IOCTL",
            &mut values,
        )
    }

    fn drive_mode(&self) -> Result<PinDriveMode> {
        decode_drive_mode(line_info(&self.chip, self.pin)?.flags())
    }

    fn set_drive_mode(&self, mode: PinDriveMode) -> Result<()> {
        let config = match mode {
            PinDriveMode::OpenDrain => {
                LineConfig::new(LineFlags::OUTPUT | LineFlags::OPEN_DRAIN | LineFlags::BIAS_DISABLED)
            }
            PinDriveMode::OpenSource => {
                LineConfig::new(LineFlags::OUTPUT | LineFlags::OPEN_SOURCE | LineFlags::BIAS_DISABLED)
            }
            PinDriveMode::Output => {
                let current = self.read()?;
                LineConfig::new(LineFlags::OUTPUT | LineFlags::BIAS_DISABLED)
                    .with_output_value(current.into())
            }
            PinDriveMode::Pwm | PinDriveMode::Clock | PinDriveMode::AlternateFunction => {
                return Err(Error::NotSupported);
            }
            input => {
                let flags = Self::input_flags(input).ok_or(Error::NotSupported)?;
                LineConfig::new(flags | *self.edges.lock())
            }
        };

        if !mode.is_input() {
            // Edge detection is only valid on inputs.
            self.detach()?;
        }
        self.configure(config)
    }

    fn enable_interrupt(&self, edge: PinEdge, isr: Option<Isr>) -> Result<()> {
        let (edge, isr) = match (edge, isr) {
            (PinEdge::None, _) | (_, None) => {
                let had_edges = !self.edges.lock().is_empty();
                self.detach()?;
                if had_edges {
                    if let Some(flags) = Self::input_flags(self.drive_mode()?) {
                        self.configure(LineConfig::new(flags))?;
                    }
                }
                return Ok(());
            }
            (edge, Some(isr)) => (edge, isr),
        };

        let flags = Self::input_flags(self.drive_mode()?).ok_or(Error::NotSupported)?;
        let edges = match edge {
            PinEdge::Rising => LineFlags::EDGE_RISING,
            PinEdge::Falling => LineFlags::EDGE_FALLING,
            _ => LineFlags::EDGE_RISING | LineFlags::EDGE_FALLING,
        };
        self.configure(LineConfig::new(flags | edges))?;
        self.attach(edges, isr)
    }
}

impl Drop for CdevGpioPin {
    fn drop(&mut self) {
        if let Err(err) = self.detach() {
            log::warn!("line {}: failed to detach interrupt: {err}", self.pin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    fn record(id: u32) -> [u8; EVENT_SIZE] {
        let mut bytes = [0u8; EVENT_SIZE];
        bytes[8..12].copy_from_slice(&id.to_ne_bytes());
        bytes
    }

    #[test]
    fn drains_every_pending_event() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (rd, mut wr) = unsafe { (OwnedFd::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
        wr.write_all(&record(uapi::GPIO_V2_LINE_EVENT_RISING_EDGE)).unwrap();
        wr.write_all(&record(GPIO_V2_LINE_EVENT_FALLING_EDGE)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let isr: Isr = Arc::new(move |edge| sink.lock().unwrap().push(edge));
        drain_events(rd.as_raw_fd(), &isr);

        assert_eq!(*seen.lock().unwrap(), vec![PinEdge::Rising, PinEdge::Falling]);
    }

    /// A pin whose line descriptor is the read end of a pipe.
    fn piped_pin() -> (CdevGpioPin, File) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (line, wr) = unsafe { (OwnedFd::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
        let pin = CdevGpioPin {
            pin: 4,
            chip: Arc::new(tempfile::tempfile().unwrap()),
            line,
            edges: spin::Mutex::new(LineFlags::empty()),
        };
        (pin, wr)
    }

    #[test]
    #[serial]
    fn attached_line_delivers_through_shared_poller() {
        let (pin, mut wr) = piped_pin();
        let (tx, rx) = mpsc::channel();
        let isr: Isr = Arc::new(move |edge| {
            let _ = tx.send(edge);
        });

        pin.attach(LineFlags::EDGE_FALLING, isr).unwrap();
        assert!(EVENTS.is_active());
        wr.write_all(&record(GPIO_V2_LINE_EVENT_FALLING_EDGE)).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), PinEdge::Falling);

        pin.detach().unwrap();
        assert!(pin.edges.lock().is_empty());
        assert!(!EVENTS.is_active());
        wr.write_all(&record(uapi::GPIO_V2_LINE_EVENT_RISING_EDGE)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    #[serial]
    fn dropping_pin_deregisters_before_close() {
        let (pin, _wr) = piped_pin();
        let isr: Isr = Arc::new(|_| {});
        pin.attach(LineFlags::EDGE_RISING | LineFlags::EDGE_FALLING, isr).unwrap();
        assert!(EVENTS.is_active());

        drop(pin);
        assert!(!EVENTS.is_active());
    }

    #[test]
    fn drive_mode_decoding() {
        assert_eq!(
            decode_drive_mode(LineFlags::INPUT | LineFlags::BIAS_PULL_UP).unwrap(),
            PinDriveMode::InputPullUp
        );
        assert_eq!(
            decode_drive_mode(LineFlags::OUTPUT | LineFlags::OPEN_DRAIN).unwrap(),
            PinDriveMode::OpenDrain
        );
        assert_eq!(decode_drive_mode(LineFlags::OUTPUT).unwrap(), PinDriveMode::Output);
        assert!(matches!(decode_drive_mode(LineFlags::USED), Err(Error::NotSupported)));
    }

    #[test]
    fn enumerates_chip_nodes_only() {
        let root = tempfile::tempdir().unwrap();
        File::create(root.path().join("gpiochip0")).unwrap();
        File::create(root.path().join("gpiochip1")).unwrap();
        File::create(root.path().join("null")).unwrap();

        let provider = CdevGpioProvider::with_root(root.path());
        let controllers = provider.controllers();
        assert_eq!(controllers.len(), 2);
        assert_eq!(controllers[0].backend(), Backend::CharacterDevice);
        assert!(controllers[0].key().ends_with("gpiochip0"));

        // A regular file does not answer the chip ioctls.
        assert!(matches!(controllers[0].count(), Err(Error::Ioctl { .. })));
        assert_eq!(provider.controllers_named("gpiochip1").len(), 1);
        assert!(provider.controllers_named("gpiochip7").is_empty());
    }

    #[test]
    fn missing_root_yields_nothing() {
        let provider = CdevGpioProvider::with_root("/nonexistent/dev");
        assert!(provider.controllers().is_empty());
    }
}
