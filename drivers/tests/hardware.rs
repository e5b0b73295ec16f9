//! Checks that need a real board. Run with `--ignored` as root.

use serial_test::serial;

use drivers::devices::GpioController;
use drivers::hal::gpio::{PinDriveMode, PinValue};
use drivers::platform::PlatformInfo;
use drivers::platform::bcm2835::{ClockManager, ClockSource};

#[test]
#[ignore]
#[serial]
fn output_level_reads_back() {
    let _ = env_logger::builder().is_test(true).try_init();
    let controller = GpioController::system_default().unwrap();
    let pin = controller.open(17).unwrap();
    pin.set_drive_mode(PinDriveMode::Output).unwrap();
    assert_eq!(pin.drive_mode().unwrap(), PinDriveMode::Output);

    pin.write(PinValue::High).unwrap();
    assert_eq!(pin.read().unwrap(), PinValue::High);
    pin.write(PinValue::Low).unwrap();
    assert_eq!(pin.read().unwrap(), PinValue::Low);
}

#[test]
#[ignore]
#[serial]
fn oscillator_matches_detected_platform() {
    let clocks = ClockManager::system();
    let expected = PlatformInfo::system().crystal_hz();
    assert_eq!(clocks.query_frequency(ClockSource::Oscillator).unwrap(), expected);
    assert!(clocks.query_frequency(ClockSource::PllD).unwrap() > 0);
}
