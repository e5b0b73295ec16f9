//! Legacy sysfs GPIO Backend
//!
//! Pins are exported through `/sys/class/gpio/export` and then driven by
//! reading and writing the pseudo-files of `gpio<N>/`. Edge events are
//! signalled by the kernel as `POLLPRI` on the pin's `value` file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use common::sync::Poller;
use common::{Error, Result};

use crate::hal::gpio::{
    Backend, GpioControllerProvider, GpioPinProvider, GpioProvider, Isr, PinDriveMode, PinEdge,
    PinValue,
};

/// Where the kernel publishes the GPIO class.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

static EVENTS: spin::Lazy<Poller<Isr>> = spin::Lazy::new(|| Poller::new(read_value));

/// Rewind a `value` file, read its first byte and report the edge it implies.
fn read_value(fd: RawFd, isr: &Isr) {
    let mut byte = 0u8;
    unsafe { libc::lseek(fd, 0, libc::SEEK_SET) };
    loop {
        let n = unsafe { libc::read(fd, (&mut byte as *mut u8).cast(), 1) };
        if n >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EIO) => continue,
            _ => {
                log::debug!("reading value descriptor {fd}: {err}");
                return;
            }
        }
    }
    isr(edge_from_byte(byte));
}

fn edge_from_byte(byte: u8) -> PinEdge {
    match byte {
        0 | b'0' => PinEdge::Falling,
        _ => PinEdge::Rising,
    }
}

fn read_attr<T: FromStr>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .map_err(|err| Error::NotFound(format!("{}: {err}", path.display())))?;
    text.trim().parse().map_err(|_| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: unexpected content {:?}", path.display(), text.trim()),
        ))
    })
}

fn write_attr(path: &Path, value: impl AsRef<[u8]>) -> Result<()> {
    fs::write(path, value).map_err(|err| Error::Access(format!("{}: {err}", path.display())))
}

/// Enumerates the `gpiochip*` directories of the sysfs GPIO class.
#[derive(Debug, Clone)]
pub struct SysfsGpioProvider {
    root: PathBuf,
}

impl SysfsGpioProvider {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_SYSFS_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidates(&self, matches: impl Fn(&str) -> bool) -> Vec<Box<dyn GpioControllerProvider>> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| matches(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| match SysfsGpioController::new(&self.root, &path) {
                Ok(controller) => Some(Box::new(controller) as Box<dyn GpioControllerProvider>),
                Err(err) => {
                    log::debug!("skipping {}: {err}", path.display());
                    None
                }
            })
            .collect()
    }
}

impl Default for SysfsGpioProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioProvider for SysfsGpioProvider {
    fn controllers(&self) -> Vec<Box<dyn GpioControllerProvider>> {
        self.candidates(|name| name.starts_with("gpiochip"))
    }

    /// Matches the chip directory name, e.g. `gpiochip0`.
    fn controllers_named(&self, name: &str) -> Vec<Box<dyn GpioControllerProvider>> {
        self.candidates(|entry| entry == name)
    }
}

/// One `gpiochip<BASE>` directory.
#[derive(Debug)]
pub struct SysfsGpioController {
    root: PathBuf,
    chip: PathBuf,
}

impl SysfsGpioController {
    pub fn new(root: &Path, chip: &Path) -> Result<Self> {
        // Follows the symlinks sysfs uses for class entries.
        let meta = fs::metadata(chip).map_err(|_| Error::NotFound(chip.display().to_string()))?;
        if !meta.is_dir() {
            return Err(Error::NotSupported);
        }
        Ok(Self {
            root: root.to_path_buf(),
            chip: chip.to_path_buf(),
        })
    }
}

impl GpioControllerProvider for SysfsGpioController {
    fn open(&self, pin: u32) -> Result<Box<dyn GpioPinProvider>> {
        let base = self.base()?;
        let count = self.count()?;
        if pin < base || pin >= base + count {
            return Err(Error::invalid_argument(
                "SysfsGpioController::open",
                format!("{base} <= pin < {}", base + count),
                pin,
            ));
        }

        // Already exported pins reject the write; the directory check decides.
        if let Err(err) = write_attr(&self.root.join("export"), pin.to_string()) {
            log::debug!("export {pin}: {err}");
        }
        let dir = self.root.join(format!("gpio{pin}"));
        if !dir.exists() {
            return Err(Error::Access(dir.display().to_string()));
        }
        log::debug!("exported {}", dir.display());

        Ok(Box::new(SysfsGpioPin {
            pin,
            root: self.root.clone(),
            dir,
            watch: spin::Mutex::new(None),
        }))
    }

    fn key(&self) -> String {
        format!("sysfs:{}", self.chip.display())
    }

    fn base(&self) -> Result<u32> {
        read_attr(&self.chip.join("base"))
    }

    fn count(&self) -> Result<u32> {
        read_attr(&self.chip.join("ngpio"))
    }

    fn name(&self) -> Result<String> {
        read_attr(&self.chip.join("label"))
    }

    fn backend(&self) -> Backend {
        Backend::LegacyFile
    }
}

/// One exported pin.
pub struct SysfsGpioPin {
    pin: u32,
    root: PathBuf,
    dir: PathBuf,
    /// `value` file registered with the multiplexer.
    watch: spin::Mutex<Option<File>>,
}

impl SysfsGpioPin {
    fn detach(&self) -> Result<()> {
        let Some(file) = self.watch.lock().take() else {
            return Ok(());
        };
        EVENTS.remove(file.as_raw_fd())
    }
}

impl GpioPinProvider for SysfsGpioPin {
    fn pin_number(&self) -> u32 {
        self.pin
    }

    fn read(&self) -> Result<PinValue> {
        let value: u8 = read_attr(&self.dir.join("value"))?;
        Ok(PinValue::from(value != 0))
    }

    fn write(&self, value: PinValue) -> Result<()> {
        let text = if bool::from(value) { "1" } else { "0" };
        write_attr(&self.dir.join("value"), text)
    }

    fn drive_mode(&self) -> Result<PinDriveMode> {
        let direction: String = read_attr(&self.dir.join("direction"))?;
        Ok(match direction.as_str() {
            "out" => PinDriveMode::Output,
            _ => PinDriveMode::Input,
        })
    }

    fn set_drive_mode(&self, mode: PinDriveMode) -> Result<()> {
        let direction = match mode {
            PinDriveMode::Input => "in",
            PinDriveMode::Output => "out",
            _ => return Err(Error::NotSupported),
        };
        write_attr(&self.dir.join("direction"), direction)
    }

    fn enable_interrupt(&self, edge: PinEdge, isr: Option<Isr>) -> Result<()> {
        let (setting, isr) = match (edge, isr) {
            (PinEdge::None, _) | (_, None) => ("none", None),
            (PinEdge::Rising, isr) => ("rising", isr),
            (PinEdge::Falling, isr) => ("falling", isr),
            (PinEdge::Both, isr) => ("both", isr),
        };
        write_attr(&self.dir.join("edge"), setting)?;

        self.detach()?;
        let Some(isr) = isr else {
            return Ok(());
        };

        let path = self.dir.join("value");
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(&path)
            .map_err(|err| Error::Access(format!("{}: {err}", path.display())))?;
        EVENTS.add(file.as_raw_fd(), libc::POLLPRI | libc::POLLERR, isr)?;
        *self.watch.lock() = Some(file);
        Ok(())
    }
}

impl Drop for SysfsGpioPin {
    fn drop(&mut self) {
        if let Err(err) = self.detach() {
            log::warn!("gpio{}: failed to detach interrupt: {err}", self.pin);
        }
        if let Err(err) = write_attr(&self.root.join("unexport"), self.pin.to_string()) {
            log::warn!("gpio{}: {err}", self.pin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    fn fake_class() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let chip = root.path().join("gpiochip0");
        fs::create_dir(&chip).unwrap();
        fs::write(chip.join("label"), "pinctrl-bcm2711\n").unwrap();
        fs::write(chip.join("ngpio"), "58\n").unwrap();
        fs::write(chip.join("base"), "0\n").unwrap();
        fs::write(root.path().join("gpiochip512"), "not a directory").unwrap();
        fs::write(root.path().join("export"), "").unwrap();
        fs::write(root.path().join("unexport"), "").unwrap();

        // Stand-in for what the kernel creates on export.
        let pin = root.path().join("gpio5");
        fs::create_dir(&pin).unwrap();
        fs::write(pin.join("value"), "1\n").unwrap();
        fs::write(pin.join("direction"), "in\n").unwrap();
        fs::write(pin.join("edge"), "none\n").unwrap();
        root
    }

    #[test]
    fn enumerates_directories_only() {
        let root = fake_class();
        let provider = SysfsGpioProvider::with_root(root.path());
        let controllers = provider.controllers();
        assert_eq!(controllers.len(), 1);
        assert_eq!(controllers[0].name().unwrap(), "pinctrl-bcm2711");
        assert_eq!(controllers[0].count().unwrap(), 58);
        assert_eq!(controllers[0].base().unwrap(), 0);
        assert_eq!(controllers[0].backend(), Backend::LegacyFile);
        assert!(matches!(
            controllers[0].drive_strength(0),
            Err(Error::NotSupported)
        ));

        assert_eq!(provider.controllers_named("gpiochip0").len(), 1);
        assert!(provider.controllers_named("gpiochip512").is_empty());
    }

    #[test]
    fn controller_construction_checks_entry_kind() {
        let root = fake_class();
        assert!(matches!(
            SysfsGpioController::new(root.path(), &root.path().join("gpiochip9")),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            SysfsGpioController::new(root.path(), &root.path().join("gpiochip512")),
            Err(Error::NotSupported)
        ));
    }

    #[test]
    fn open_exports_and_drop_unexports() {
        let root = fake_class();
        let controller =
            SysfsGpioController::new(root.path(), &root.path().join("gpiochip0")).unwrap();

        assert!(matches!(controller.open(58), Err(Error::InvalidArgument { .. })));
        assert!(matches!(controller.open(6), Err(Error::Access(_))));

        let pin = controller.open(5).unwrap();
        assert_eq!(fs::read_to_string(root.path().join("export")).unwrap(), "5");
        assert_eq!(pin.read().unwrap(), PinValue::High);
        assert_eq!(pin.drive_mode().unwrap(), PinDriveMode::Input);

        pin.set_drive_mode(PinDriveMode::Output).unwrap();
        pin.write(PinValue::Low).unwrap();
        assert_eq!(pin.drive_mode().unwrap(), PinDriveMode::Output);
        assert_eq!(pin.read().unwrap(), PinValue::Low);
        assert!(matches!(
            pin.set_drive_mode(PinDriveMode::OpenDrain),
            Err(Error::NotSupported)
        ));

        drop(pin);
        assert_eq!(fs::read_to_string(root.path().join("unexport")).unwrap(), "5");
    }

    #[test]
    #[serial]
    fn edge_setting_follows_requests() {
        let root = fake_class();
        let controller =
            SysfsGpioController::new(root.path(), &root.path().join("gpiochip0")).unwrap();
        let pin = controller.open(5).unwrap();
        let edge = root.path().join("gpio5/edge");

        let isr: Isr = Arc::new(|_| {});
        pin.enable_interrupt(PinEdge::Both, Some(isr.clone())).unwrap();
        assert_eq!(fs::read_to_string(&edge).unwrap(), "both");
        assert!(EVENTS.is_active());

        pin.enable_interrupt(PinEdge::Falling, Some(isr)).unwrap();
        assert_eq!(fs::read_to_string(&edge).unwrap(), "falling");
        assert!(EVENTS.is_active());

        pin.enable_interrupt(PinEdge::Rising, None).unwrap();
        assert_eq!(fs::read_to_string(&edge).unwrap(), "none");
        assert!(!EVENTS.is_active());
    }

    #[test]
    #[serial]
    fn dropping_watched_pin_stops_events_then_unexports() {
        let root = fake_class();
        let controller =
            SysfsGpioController::new(root.path(), &root.path().join("gpiochip0")).unwrap();
        let pin = controller.open(5).unwrap();

        let isr: Isr = Arc::new(|_| {});
        pin.enable_interrupt(PinEdge::Rising, Some(isr)).unwrap();
        assert!(EVENTS.is_active());

        drop(pin);
        assert!(!EVENTS.is_active());
        assert_eq!(fs::read_to_string(root.path().join("unexport")).unwrap(), "5");
    }

    #[test]
    fn value_byte_decides_edge() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let isr: Isr = Arc::new(move |edge| sink.lock().unwrap().push(edge));

        for content in ["0\n", "1\n"] {
            let mut file = tempfile::tempfile().unwrap();
            file.write_all(content.as_bytes()).unwrap();
            read_value(file.as_raw_fd(), &isr);
        }
        assert_eq!(*seen.lock().unwrap(), vec![PinEdge::Falling, PinEdge::Rising]);
        assert_eq!(edge_from_byte(0), PinEdge::Falling);
    }
}
