//! BCM2835 GPIO Controller Driver
//!
//! This module provides both raw hardware access and HAL implementations
//! for the BCM2835 family GPIO controller.
//!
//! The controller has no interrupt line reachable from user space, so edge
//! events are collected by an [`EdgePoller`] thread that samples the event
//! detect status registers.

use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use common::{Error, Result};

use super::{PeripheralMap, RegisterBlock};
use crate::hal::gpio::{
    Backend, GpioControllerProvider, GpioPinProvider, GpioProvider, Isr, PinDriveMode,
    PinDriveStrength, PinEdge, PinValue,
};
use crate::hw::bcm2835::gpio::{
    Bcm2711Pull, Function, GpioRegisters, LegacyPull, PIN_COUNT, bank_bit, fsel_field, pull_field,
};
use crate::hw::bcm2835::power::{PADS_DRIVE_MASK, PADS_HYST, PowerRegisters};
use crate::hw::bcm2835::{PASSWORD, PeripheralKind};
use crate::platform::SocGeneration;

/// Default interval between two samples of the event status registers.
pub const DEFAULT_POLLING_ACCURACY: Duration = Duration::from_millis(1);

/// Pad banks with their own PADS register.
const PAD_BANKS: u32 = 3;

/// Pins with a PWM or GPCLK alternate function, as (pin, ALTn, role).
const ALT_ROLES: &[(u32, usize, PinDriveMode)] = &[
    (4, 0, PinDriveMode::Clock),  // GPCLK0
    (5, 0, PinDriveMode::Clock),  // GPCLK1
    (6, 0, PinDriveMode::Clock),  // GPCLK2
    (12, 0, PinDriveMode::Pwm),   // PWM0_0
    (13, 0, PinDriveMode::Pwm),   // PWM0_1
    (18, 5, PinDriveMode::Pwm),   // PWM0_0
    (19, 5, PinDriveMode::Pwm),   // PWM0_1
    (20, 5, PinDriveMode::Clock), // GPCLK0
    (21, 5, PinDriveMode::Clock), // GPCLK1
    (32, 0, PinDriveMode::Clock), // GPCLK0
    (34, 0, PinDriveMode::Clock), // GPCLK0
    (40, 0, PinDriveMode::Pwm),   // PWM1_0
    (41, 0, PinDriveMode::Pwm),   // PWM1_1
    (42, 0, PinDriveMode::Clock), // GPCLK1
    (43, 0, PinDriveMode::Clock), // GPCLK2
    (44, 0, PinDriveMode::Clock), // GPCLK1
    (45, 0, PinDriveMode::Pwm),   // PWM0_1
];

fn role_of(pin: u32, function: Function) -> Option<PinDriveMode> {
    ALT_ROLES
        .iter()
        .find(|(p, alt, _)| *p == pin && Function::ALT[*alt] == function)
        .map(|(_, _, role)| *role)
}

fn function_for(pin: u32, role: PinDriveMode) -> Option<Function> {
    ALT_ROLES
        .iter()
        .find(|(p, _, r)| *p == pin && *r == role)
        .map(|(_, alt, _)| Function::ALT[*alt])
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Pull {
    Off,
    Up,
    Down,
}

fn delay_cycles(count: u32) {
    for _ in 0..count {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Raw Hardware Functions
// ============================================================================

fn function(r: *mut GpioRegisters, pin: u32) -> Function {
    let (reg, shift) = fsel_field(pin);
    let fsel = unsafe { read_volatile(addr_of!((*r).gpfsel[reg])) };
    Function::from_bits(fsel >> shift)
}

fn set_function(r: *mut GpioRegisters, pin: u32, func: Function) {
    let (reg, shift) = fsel_field(pin);
    let mask = 0b111 << shift;

    unsafe {
        let fsel = addr_of_mut!((*r).gpfsel[reg]);
        let val = read_volatile(fsel);
        write_volatile(fsel, (val & !mask) | ((func as u32) << shift));
    }
}

fn level(r: *mut GpioRegisters, pin: u32) -> PinValue {
    let (reg, bit) = bank_bit(pin);
    PinValue::from(unsafe { read_volatile(addr_of!((*r).gplev[reg])) } & bit != 0)
}

fn set_level(r: *mut GpioRegisters, pin: u32, value: PinValue) {
    let (reg, bit) = bank_bit(pin);
    unsafe {
        match value {
            PinValue::High => write_volatile(addr_of_mut!((*r).gpset[reg]), bit),
            PinValue::Low => write_volatile(addr_of_mut!((*r).gpclr[reg]), bit),
        }
    }
}

/// Pull state, where the hardware lets it be read back.
fn pull(r: *mut GpioRegisters, generation: SocGeneration, pin: u32) -> Option<Pull> {
    if generation != SocGeneration::Bcm2711 {
        return None;
    }
    let (reg, shift) = pull_field(pin);
    let bits = unsafe { read_volatile(addr_of!((*r).pup_pdn_cntrl[reg])) } >> shift;
    match Bcm2711Pull::from_bits(bits)? {
        Bcm2711Pull::Off => Some(Pull::Off),
        Bcm2711Pull::Up => Some(Pull::Up),
        Bcm2711Pull::Down => Some(Pull::Down),
    }
}

fn set_pull(r: *mut GpioRegisters, generation: SocGeneration, pin: u32, pull: Pull) {
    match generation {
        SocGeneration::Bcm2711 => {
            let code = match pull {
                Pull::Off => Bcm2711Pull::Off,
                Pull::Up => Bcm2711Pull::Up,
                Pull::Down => Bcm2711Pull::Down,
            };
            let (reg, shift) = pull_field(pin);
            unsafe {
                let cntrl = addr_of_mut!((*r).pup_pdn_cntrl[reg]);
                let val = read_volatile(cntrl);
                write_volatile(cntrl, (val & !(0b11 << shift)) | ((code as u32) << shift));
            }
        }
        SocGeneration::Legacy => {
            let code = match pull {
                Pull::Off => LegacyPull::Off,
                Pull::Up => LegacyPull::Up,
                Pull::Down => LegacyPull::Down,
            };
            let (reg, bit) = bank_bit(pin);
            unsafe {
                let gppud = addr_of_mut!((*r).gppud);
                let clk = addr_of_mut!((*r).gppudclk[reg]);

                write_volatile(gppud, code as u32);
                delay_cycles(150);

                write_volatile(clk, bit);
                delay_cycles(150);
                write_volatile(clk, bit);
                delay_cycles(150);

                write_volatile(gppud, 0);
                write_volatile(clk, 0);
            }
        }
    }
}

fn configure_edge_detect(r: *mut GpioRegisters, pin: u32, rising: bool, falling: bool) {
    let (reg, bit) = bank_bit(pin);
    let update = |ptr: *mut u32, enable: bool| unsafe {
        let val = read_volatile(ptr);
        write_volatile(ptr, if enable { val | bit } else { val & !bit });
    };

    unsafe {
        update(addr_of_mut!((*r).gpren[reg]), rising);
        update(addr_of_mut!((*r).gpfen[reg]), falling);
        // Drop anything latched before the new configuration.
        write_volatile(addr_of_mut!((*r).gpeds[reg]), bit);
    }
}

fn read_bitmap(lo: *const u32, hi: *const u32) -> u64 {
    unsafe { u64::from(read_volatile(lo)) | (u64::from(read_volatile(hi)) << 32) }
}

// ============================================================================
// Edge Polling
// ============================================================================

/// Samples the event detect status registers and dispatches pin callbacks.
///
/// The worker starts with the first registration and stops with the last
/// removal. When the last removal happens inside a callback the worker
/// leaves on its own after the current cycle.
pub struct EdgePoller {
    regs: RegisterBlock<GpioRegisters>,
    isrs: spin::Mutex<BTreeMap<u32, Isr>>,
    accuracy: spin::Mutex<Duration>,
    worker: spin::Mutex<Option<Worker>>,
}

struct Worker {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl Worker {
    fn is_current(&self) -> bool {
        self.handle.thread().id() == thread::current().id()
    }
}

impl EdgePoller {
    fn new(regs: RegisterBlock<GpioRegisters>) -> Self {
        Self {
            regs,
            isrs: spin::Mutex::new(BTreeMap::new()),
            accuracy: spin::Mutex::new(DEFAULT_POLLING_ACCURACY),
            worker: spin::Mutex::new(None),
        }
    }

    pub fn polling_accuracy(&self) -> Duration {
        *self.accuracy.lock()
    }

    /// Lower the sampling interval. Requests for a coarser interval than the
    /// current one are ignored.
    pub fn set_polling_accuracy(&self, accuracy: Duration) {
        let mut current = self.accuracy.lock();
        *current = (*current).min(accuracy);
    }

    fn register(self: &Arc<Self>, pin: u32, isr: Isr) -> Result<()> {
        self.isrs.lock().insert(pin, isr);

        let mut worker = self.worker.lock();
        if let Some(w) = worker.as_ref() {
            if w.is_current() || (w.running.load(Ordering::Acquire) && !w.handle.is_finished()) {
                w.running.store(true, Ordering::Release);
                return Ok(());
            }
        }

        // Any previous worker is stopping or gone; it is joined once the
        // replacement is in place.
        let stale = worker.take();
        let running = Arc::new(AtomicBool::new(true));
        let poller = Arc::clone(self);
        let flag = Arc::clone(&running);
        let spawned = thread::Builder::new()
            .name("bcm2835-gpio-events".into())
            .spawn(move || poller.run(&flag));
        let result = match spawned {
            Ok(handle) => {
                log::debug!("gpio edge poller started");
                *worker = Some(Worker { handle, running });
                Ok(())
            }
            Err(err) => {
                self.isrs.lock().remove(&pin);
                Err(err.into())
            }
        };
        drop(worker);

        if let Some(stale) = stale {
            stale.running.store(false, Ordering::Release);
            if stale.handle.join().is_err() {
                log::warn!("gpio edge poller panicked");
            }
        }
        result
    }

    fn unregister(&self, pin: u32) {
        if self.isrs.lock().remove(&pin).is_none() {
            return;
        }

        let mut worker = self.worker.lock();
        if !self.isrs.lock().is_empty() {
            return;
        }
        let Some(w) = worker.as_ref() else {
            return;
        };
        w.running.store(false, Ordering::Release);
        if w.is_current() {
            return;
        }
        let Some(w) = worker.take() else {
            return;
        };
        drop(worker);

        if w.handle.join().is_err() {
            log::warn!("gpio edge poller panicked");
        }
        log::debug!("gpio edge poller stopped");
    }

    fn run(&self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            self.poll_once();
            thread::sleep(self.polling_accuracy());
        }
    }

    fn poll_once(&self) {
        let r = self.regs.as_ptr();
        let events = unsafe {
            read_bitmap(addr_of!((*r).gpeds[0]), addr_of!((*r).gpeds[1]))
        };
        if events == 0 {
            return;
        }

        // Write-1-to-clear.
        unsafe {
            write_volatile(addr_of_mut!((*r).gpeds[0]), events as u32);
            write_volatile(addr_of_mut!((*r).gpeds[1]), (events >> 32) as u32);
        }
        let levels = unsafe {
            read_bitmap(addr_of!((*r).gplev[0]), addr_of!((*r).gplev[1]))
        };

        let ready: Vec<(u32, Isr)> = self
            .isrs
            .lock()
            .iter()
            .filter(|(pin, _)| events & (1 << **pin) != 0)
            .map(|(pin, isr)| (*pin, Arc::clone(isr)))
            .collect();

        for (pin, isr) in ready {
            let edge = if levels & (1 << pin) != 0 {
                PinEdge::Rising
            } else {
                PinEdge::Falling
            };
            isr(edge);
        }
    }
}

// ============================================================================
// HAL Implementation
// ============================================================================

/// Edge pollers by the address of the register block they sample. Like the
/// mappings themselves, they live for the rest of the process.
static EDGE_POLLERS: spin::Mutex<BTreeMap<usize, Arc<EdgePoller>>> =
    spin::Mutex::new(BTreeMap::new());

/// The edge poller shared by every controller over `regs`.
fn edge_poller(regs: RegisterBlock<GpioRegisters>) -> Arc<EdgePoller> {
    let mut pollers = EDGE_POLLERS.lock();
    let poller = pollers
        .entry(regs.as_ptr() as usize)
        .or_insert_with(|| Arc::new(EdgePoller::new(regs)));
    Arc::clone(poller)
}

/// Direct-register GPIO provider. Exposes a single controller.
pub struct Bcm2835GpioProvider {
    map: &'static PeripheralMap,
}

impl Bcm2835GpioProvider {
    pub const fn new(map: &'static PeripheralMap) -> Self {
        Self { map }
    }

    /// Provider over the running system's registers.
    pub fn system() -> Self {
        Self::new(PeripheralMap::system())
    }

    /// The single controller, or the error that prevented mapping it.
    pub fn controller(&self) -> Result<Bcm2835GpioController> {
        let regs = self.map.get::<GpioRegisters>(0)?;
        Ok(Bcm2835GpioController {
            map: self.map,
            regs,
            events: edge_poller(regs),
        })
    }
}

impl GpioProvider for Bcm2835GpioProvider {
    fn controllers(&self) -> Vec<Box<dyn GpioControllerProvider>> {
        match self.controller() {
            Ok(controller) => vec![Box::new(controller)],
            Err(err) => {
                log::debug!("direct register gpio unavailable: {err}");
                Vec::new()
            }
        }
    }

    fn controllers_named(&self, _name: &str) -> Vec<Box<dyn GpioControllerProvider>> {
        self.controllers()
    }
}

/// The GPIO block of the SoC.
pub struct Bcm2835GpioController {
    map: &'static PeripheralMap,
    regs: RegisterBlock<GpioRegisters>,
    events: Arc<EdgePoller>,
}

impl Bcm2835GpioController {
    /// See [`EdgePoller::set_polling_accuracy`].
    pub fn set_polling_accuracy(&self, accuracy: Duration) {
        self.events.set_polling_accuracy(accuracy);
    }

    fn pads(&self, function: &'static str, bank: u32) -> Result<*mut u32> {
        if bank >= PAD_BANKS {
            return Err(Error::invalid_argument(function, "bank <= 2", bank));
        }
        let pm = self.map.get::<PowerRegisters>(0)?.as_ptr();
        Ok(unsafe { addr_of_mut!((*pm).pads[bank as usize]) })
    }
}

impl GpioControllerProvider for Bcm2835GpioController {
    fn open(&self, pin: u32) -> Result<Box<dyn GpioPinProvider>> {
        if pin >= PIN_COUNT {
            return Err(Error::invalid_argument(
                "Bcm2835GpioController::open",
                format!("0 <= pin < {PIN_COUNT}"),
                pin,
            ));
        }
        Ok(Box::new(Bcm2835GpioPin {
            pin,
            regs: self.regs,
            generation: self.map.info().generation(),
            events: Arc::clone(&self.events),
        }))
    }

    fn key(&self) -> String {
        format!(
            "bcm2835-gpio@{:#x}",
            self.map.physical_address(PeripheralKind::Gpio, 0)
        )
    }

    fn base(&self) -> Result<u32> {
        Ok(0)
    }

    fn count(&self) -> Result<u32> {
        Ok(PIN_COUNT)
    }

    fn name(&self) -> Result<String> {
        Ok("Direct register General Purpose Input Output controller".into())
    }

    fn backend(&self) -> Backend {
        Backend::DirectRegister
    }

    fn drive_strength(&self, bank: u32) -> Result<PinDriveStrength> {
        let pads = self.pads("Bcm2835GpioController::drive_strength", bank)?;
        Ok(PinDriveStrength::from_bits(unsafe { read_volatile(pads) }))
    }

    fn set_drive_strength(&self, bank: u32, strength: PinDriveStrength) -> Result<()> {
        let pads = self.pads("Bcm2835GpioController::set_drive_strength", bank)?;
        unsafe {
            let val = read_volatile(pads) & !PADS_DRIVE_MASK & 0x00ff_ffff;
            write_volatile(pads, PASSWORD | val | strength as u32);
        }
        Ok(())
    }

    fn hysteresis(&self, bank: u32) -> Result<bool> {
        let pads = self.pads("Bcm2835GpioController::hysteresis", bank)?;
        Ok(unsafe { read_volatile(pads) } & PADS_HYST != 0)
    }

    fn set_hysteresis(&self, bank: u32, enabled: bool) -> Result<()> {
        let pads = self.pads("Bcm2835GpioController::set_hysteresis", bank)?;
        unsafe {
            let val = read_volatile(pads) & !PADS_HYST & 0x00ff_ffff;
            write_volatile(pads, PASSWORD | val | if enabled { PADS_HYST } else { 0 });
        }
        Ok(())
    }
}

/// One pin of the GPIO block.
pub struct Bcm2835GpioPin {
    pin: u32,
    regs: RegisterBlock<GpioRegisters>,
    generation: SocGeneration,
    events: Arc<EdgePoller>,
}

impl GpioPinProvider for Bcm2835GpioPin {
    fn pin_number(&self) -> u32 {
        self.pin
    }

    fn read(&self) -> Result<PinValue> {
        Ok(level(self.regs.as_ptr(), self.pin))
    }

    fn write(&self, value: PinValue) -> Result<()> {
        set_level(self.regs.as_ptr(), self.pin, value);
        Ok(())
    }

    fn drive_mode(&self) -> Result<PinDriveMode> {
        let r = self.regs.as_ptr();
        Ok(match function(r, self.pin) {
            Function::Input => match pull(r, self.generation, self.pin) {
                Some(Pull::Up) => PinDriveMode::InputPullUp,
                Some(Pull::Down) => PinDriveMode::InputPullDown,
                _ => PinDriveMode::Input,
            },
            Function::Output => PinDriveMode::Output,
            alt => role_of(self.pin, alt).unwrap_or(PinDriveMode::AlternateFunction),
        })
    }

    fn set_drive_mode(&self, mode: PinDriveMode) -> Result<()> {
        let r = self.regs.as_ptr();
        match mode {
            PinDriveMode::Input | PinDriveMode::InputPullUp | PinDriveMode::InputPullDown => {
                let pull = match mode {
                    PinDriveMode::InputPullUp => Pull::Up,
                    PinDriveMode::InputPullDown => Pull::Down,
                    _ => Pull::Off,
                };
                set_function(r, self.pin, Function::Input);
                set_pull(r, self.generation, self.pin, pull);
            }
            PinDriveMode::Output => {
                set_pull(r, self.generation, self.pin, Pull::Off);
                set_function(r, self.pin, Function::Output);
            }
            PinDriveMode::Pwm | PinDriveMode::Clock => {
                let func = function_for(self.pin, mode).ok_or(Error::NotSupported)?;
                set_function(r, self.pin, func);
            }
            _ => return Err(Error::NotSupported),
        }
        Ok(())
    }

    fn enable_interrupt(&self, edge: PinEdge, isr: Option<Isr>) -> Result<()> {
        let r = self.regs.as_ptr();
        match (edge, isr) {
            (PinEdge::None, _) | (_, None) => {
                configure_edge_detect(r, self.pin, false, false);
                self.events.unregister(self.pin);
                Ok(())
            }
            (edge, Some(isr)) => {
                let rising = matches!(edge, PinEdge::Rising | PinEdge::Both);
                let falling = matches!(edge, PinEdge::Falling | PinEdge::Both);
                configure_edge_detect(r, self.pin, rising, falling);
                self.events.register(self.pin, isr)
            }
        }
    }
}

impl Drop for Bcm2835GpioPin {
    fn drop(&mut self) {
        if let Err(err) = self.enable_interrupt(PinEdge::None, None) {
            log::warn!("gpio{}: detaching interrupt failed: {err}", self.pin);
        }
        if let Err(err) = self.set_drive_mode(PinDriveMode::Input) {
            log::warn!("gpio{}: reverting to input failed: {err}", self.pin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformInfo;
    use crate::platform::bcm2835::scratch_map;
    use std::sync::mpsc;

    fn controller(base: u32) -> Bcm2835GpioController {
        let map = scratch_map(PlatformInfo::new(base, 0x0100_0000));
        Bcm2835GpioProvider::new(map).controller().unwrap()
    }

    fn read(ptr: *const u32) -> u32 {
        unsafe { read_volatile(ptr) }
    }

    #[test]
    fn out_of_range_pin_is_rejected() {
        let gpio = controller(0x2000_0000);
        assert!(matches!(gpio.open(54), Err(Error::InvalidArgument { .. })));
        assert!(gpio.open(53).is_ok());
    }

    #[test]
    fn output_mode_round_trip_and_set_register() {
        let gpio = controller(0x2000_0000);
        let pin = gpio.open(17).unwrap();

        pin.set_drive_mode(PinDriveMode::Output).unwrap();
        assert_eq!(pin.drive_mode().unwrap(), PinDriveMode::Output);

        pin.write(PinValue::High).unwrap();
        let r = gpio.regs.as_ptr();
        assert_eq!(read(unsafe { addr_of!((*r).gpset[0]) }), 1 << 17);
        assert_eq!(read(unsafe { addr_of!((*r).gpfsel[1]) }) >> 21 & 0b111, 0b001);

        pin.write(PinValue::Low).unwrap();
        assert_eq!(read(unsafe { addr_of!((*r).gpclr[0]) }), 1 << 17);
    }

    #[test]
    fn pwm_and_clock_roles_follow_alt_table() {
        let gpio = controller(0x2000_0000);
        let pin18 = gpio.open(18).unwrap();
        pin18.set_drive_mode(PinDriveMode::Pwm).unwrap();
        assert_eq!(pin18.drive_mode().unwrap(), PinDriveMode::Pwm);
        let r = gpio.regs.as_ptr();
        assert_eq!(read(unsafe { addr_of!((*r).gpfsel[1]) }) >> 24 & 0b111, Function::Alt5 as u32);

        assert!(matches!(pin18.set_drive_mode(PinDriveMode::Clock), Err(Error::NotSupported)));
        assert!(matches!(pin18.set_drive_mode(PinDriveMode::OpenDrain), Err(Error::NotSupported)));

        let pin4 = gpio.open(4).unwrap();
        pin4.set_drive_mode(PinDriveMode::Clock).unwrap();
        assert_eq!(pin4.drive_mode().unwrap(), PinDriveMode::Clock);
    }

    #[test]
    fn unknown_alternate_function_decodes_generically() {
        let gpio = controller(0x2000_0000);
        let pin = gpio.open(2).unwrap();
        set_function(gpio.regs.as_ptr(), 2, Function::Alt0);
        assert_eq!(pin.drive_mode().unwrap(), PinDriveMode::AlternateFunction);
    }

    #[test]
    fn bcm2711_pulls_read_back() {
        let gpio = controller(0xfe00_0000);
        let pin = gpio.open(23).unwrap();

        pin.set_drive_mode(PinDriveMode::InputPullUp).unwrap();
        assert_eq!(pin.drive_mode().unwrap(), PinDriveMode::InputPullUp);
        let r = gpio.regs.as_ptr();
        assert_eq!(read(unsafe { addr_of!((*r).pup_pdn_cntrl[1]) }) >> 14 & 0b11, 0b01);

        pin.set_drive_mode(PinDriveMode::InputPullDown).unwrap();
        assert_eq!(pin.drive_mode().unwrap(), PinDriveMode::InputPullDown);

        pin.set_drive_mode(PinDriveMode::Output).unwrap();
        assert_eq!(read(unsafe { addr_of!((*r).pup_pdn_cntrl[1]) }) >> 14 & 0b11, 0);
    }

    #[test]
    fn legacy_pull_sequence_leaves_clock_cleared() {
        let gpio = controller(0x2000_0000);
        let pin = gpio.open(40).unwrap();
        pin.set_drive_mode(PinDriveMode::InputPullUp).unwrap();

        // Pull state cannot be read back on older chips.
        assert_eq!(pin.drive_mode().unwrap(), PinDriveMode::Input);
        let r = gpio.regs.as_ptr();
        assert_eq!(read(unsafe { addr_of!((*r).gppud) }), 0);
        assert_eq!(read(unsafe { addr_of!((*r).gppudclk[1]) }), 0);
    }

    #[test]
    fn pads_carry_password_and_reject_unknown_bank() {
        let gpio = controller(0x2000_0000);
        gpio.set_drive_strength(1, PinDriveStrength::Ma12).unwrap();
        gpio.set_hysteresis(1, true).unwrap();
        assert_eq!(gpio.drive_strength(1).unwrap(), PinDriveStrength::Ma12);
        assert!(gpio.hysteresis(1).unwrap());

        let pm = gpio.map.get::<PowerRegisters>(0).unwrap().as_ptr();
        assert_eq!(read(unsafe { addr_of!((*pm).pads[1]) }) & 0xff00_0000, PASSWORD);

        assert!(matches!(gpio.drive_strength(3), Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn drop_reverts_to_input() {
        let gpio = controller(0x2000_0000);
        let pin = gpio.open(5).unwrap();
        pin.set_drive_mode(PinDriveMode::Output).unwrap();
        drop(pin);
        assert_eq!(function(gpio.regs.as_ptr(), 5), Function::Input);
    }

    #[test]
    fn edge_events_reach_callback_with_level() {
        let gpio = controller(0x2000_0000);
        let pin = gpio.open(22).unwrap();
        let r = gpio.regs.as_ptr();

        // Scratch memory keeps write-1-to-clear bits set, so the level is
        // fixed before anything can be dispatched.
        unsafe { write_volatile(addr_of_mut!((*r).gplev[0]), 1 << 22) };

        let (tx, rx) = mpsc::channel();
        let isr: Isr = Arc::new(move |edge| {
            let _ = tx.send(edge);
        });
        pin.enable_interrupt(PinEdge::Both, Some(isr)).unwrap();
        assert_ne!(read(unsafe { addr_of!((*r).gpren[0]) }) & (1 << 22), 0);
        assert_ne!(read(unsafe { addr_of!((*r).gpfen[0]) }) & (1 << 22), 0);

        unsafe { write_volatile(addr_of_mut!((*r).gpeds[0]), 1 << 22) };
        let edge = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(edge, PinEdge::Rising);

        pin.enable_interrupt(PinEdge::None, None).unwrap();
        assert_eq!(read(unsafe { addr_of!((*r).gpren[0]) }) & (1 << 22), 0);
        assert!(gpio.events.worker.lock().is_none());
    }

    #[test]
    fn polling_accuracy_only_tightens() {
        let gpio = controller(0x2000_0000);
        gpio.set_polling_accuracy(Duration::from_micros(200));
        gpio.set_polling_accuracy(Duration::from_millis(5));
        assert_eq!(gpio.events.polling_accuracy(), Duration::from_micros(200));
    }

    #[test]
    fn providers_over_one_block_share_edge_poller() {
        let map = scratch_map(PlatformInfo::new(0x3f00_0000, 0x0100_0000));
        let first = Bcm2835GpioProvider::new(map).controller().unwrap();
        let second = Bcm2835GpioProvider::new(map).controller().unwrap();
        assert!(Arc::ptr_eq(&first.events, &second.events));

        first.set_polling_accuracy(Duration::from_micros(300));
        assert_eq!(second.events.polling_accuracy(), Duration::from_micros(300));

        let other = controller(0x3f00_0000);
        assert!(!Arc::ptr_eq(&first.events, &other.events));
    }
}
