//! Prints the detected SoC, its PLL frequencies and the GPIO controllers
//! every backend can see.
//!
//! Set `RUST_LOG=debug` to follow peripheral mapping and backend probing.

use std::process::ExitCode;

use drivers::devices::{GpioController, gpio};
use drivers::hal::gpio::GpioProvider;
use drivers::platform::PlatformInfo;
use drivers::platform::bcm2835::{Bcm2835GpioProvider, ClockManager, ClockSource};
use drivers::platform::sysfs::SysfsGpioProvider;

fn backends() -> Vec<(&'static str, Box<dyn GpioProvider>)> {
    let mut backends: Vec<(&'static str, Box<dyn GpioProvider>)> =
        vec![("direct register", Box::new(Bcm2835GpioProvider::system()))];
    #[cfg(target_os = "linux")]
    backends.push((
        "character device",
        Box::new(drivers::platform::cdev::CdevGpioProvider::new()),
    ));
    backends.push(("sysfs", Box::new(SysfsGpioProvider::new())));
    backends
}

fn print_clocks(clocks: &ClockManager) -> common::Result<()> {
    println!("OSC:  {} Hz", clocks.query_frequency(ClockSource::Oscillator)?);
    for source in ClockSource::PLLS {
        let label = format!("{source:?}:");
        println!("{label:<5} {} Hz", clocks.query_frequency(source)?);
    }
    Ok(())
}

fn describe(controller: &GpioController) -> common::Result<String> {
    let base = controller.base()?;
    Ok(format!(
        "{}: pins {base}..{}",
        controller.name()?,
        base + controller.count()?
    ))
}

fn main() -> ExitCode {
    env_logger::init();

    let info = PlatformInfo::system();
    println!(
        "Peripherals: {:#010x} + {:#x} ({:?})",
        info.base(),
        info.size(),
        info.generation()
    );

    let mut status = ExitCode::SUCCESS;
    if let Err(err) = print_clocks(&ClockManager::system()) {
        eprintln!("[ ERROR ] {err}");
        status = ExitCode::FAILURE;
    }

    for (label, provider) in backends() {
        let controllers = gpio::controllers(provider.as_ref());
        if controllers.is_empty() {
            log::info!("no {label} gpio controllers");
            continue;
        }
        for controller in controllers {
            match describe(&controller) {
                Ok(line) => println!("GPIO [{label}] {line}"),
                Err(err) => log::warn!("{}: {err}", controller.key()),
            }
        }
    }
    status
}
