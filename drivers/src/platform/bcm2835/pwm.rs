//! BCM2835 PWM Controller Driver

use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile};

use common::{Error, Result};

use super::{PeripheralMap, RegisterBlock};
use crate::hal::pwm::{Polarity, PwmChannelProvider, PwmControllerProvider, PwmProvider};
use crate::hw::bcm2835::PeripheralKind;
use crate::hw::bcm2835::pwm::{CHANNELS, PwmCtl, PwmRegisters, sta_running};
use crate::platform::SocGeneration;

/// Direct-register PWM provider.
pub struct Bcm2835PwmProvider {
    map: &'static PeripheralMap,
}

impl Bcm2835PwmProvider {
    pub const fn new(map: &'static PeripheralMap) -> Self {
        Self { map }
    }

    pub fn system() -> Self {
        Self::new(PeripheralMap::system())
    }

    /// Controllers present on this chip generation.
    pub fn instances(&self) -> usize {
        match self.map.info().generation() {
            SocGeneration::Bcm2711 => PeripheralKind::Pwm.instances(),
            SocGeneration::Legacy => 1,
        }
    }

    pub fn controller(&self, index: usize) -> Result<Bcm2835PwmController> {
        if index >= self.instances() {
            return Err(Error::invalid_argument(
                "Bcm2835PwmProvider::controller",
                format!("index < {}", self.instances()),
                index,
            ));
        }
        Ok(Bcm2835PwmController {
            index,
            phys: self.map.physical_address(PeripheralKind::Pwm, index),
            regs: self.map.get::<PwmRegisters>(index)?,
        })
    }
}

impl PwmProvider for Bcm2835PwmProvider {
    fn controllers(&self) -> Vec<Box<dyn PwmControllerProvider>> {
        (0..self.instances())
            .filter_map(|index| match self.controller(index) {
                Ok(controller) => Some(Box::new(controller) as Box<dyn PwmControllerProvider>),
                Err(err) => {
                    log::debug!("pwm{index} unavailable: {err}");
                    None
                }
            })
            .collect()
    }
}

/// One PWM block with two channels.
pub struct Bcm2835PwmController {
    index: usize,
    phys: u64,
    regs: RegisterBlock<PwmRegisters>,
}

impl PwmControllerProvider for Bcm2835PwmController {
    fn open(&self, channel: u32) -> Result<Box<dyn PwmChannelProvider>> {
        if channel >= CHANNELS {
            return Err(Error::invalid_argument(
                "Bcm2835PwmController::open",
                format!("0 <= channel < {CHANNELS}"),
                channel,
            ));
        }
        Ok(Box::new(Bcm2835PwmChannel {
            channel,
            regs: self.regs,
        }))
    }

    fn key(&self) -> String {
        format!("bcm2835-pwm@{:#x}", self.phys)
    }

    fn name(&self) -> String {
        format!("Direct register PWM controller {}", self.index)
    }

    fn count(&self) -> u32 {
        CHANNELS
    }
}

pub struct Bcm2835PwmChannel {
    channel: u32,
    regs: RegisterBlock<PwmRegisters>,
}

impl Bcm2835PwmChannel {
    fn update_ctl(&self, mask: u32, bits: u32) {
        let r = self.regs.as_ptr();
        unsafe {
            let ctl = addr_of_mut!((*r).ctl);
            let val = read_volatile(ctl);
            write_volatile(ctl, (val & !mask) | (bits & mask));
        }
    }

    fn ctl(&self) -> u32 {
        unsafe { read_volatile(addr_of!((*self.regs.as_ptr()).ctl)) }
    }
}

impl PwmChannelProvider for Bcm2835PwmChannel {
    fn channel(&self) -> u32 {
        self.channel
    }

    fn range(&self) -> u32 {
        let r = self.regs.as_ptr();
        unsafe { read_volatile(addr_of!((*r).channel[self.channel as usize].rng)) }
    }

    fn set_range(&self, range: u32) {
        let r = self.regs.as_ptr();
        unsafe { write_volatile(addr_of_mut!((*r).channel[self.channel as usize].rng), range) }
    }

    fn data(&self) -> u32 {
        let r = self.regs.as_ptr();
        unsafe { read_volatile(addr_of!((*r).channel[self.channel as usize].dat)) }
    }

    fn set_data(&self, data: u32) {
        let r = self.regs.as_ptr();
        unsafe { write_volatile(addr_of_mut!((*r).channel[self.channel as usize].dat), data) }
    }

    fn polarity(&self) -> Polarity {
        if self.ctl() & PwmCtl::POLA.for_channel(self.channel) != 0 {
            Polarity::ActiveLow
        } else {
            Polarity::ActiveHigh
        }
    }

    fn set_polarity(&self, polarity: Polarity) {
        let mask = PwmCtl::POLA.for_channel(self.channel);
        let bits = match polarity {
            Polarity::ActiveHigh => 0,
            Polarity::ActiveLow => mask,
        };
        self.update_ctl(mask, bits);
    }

    fn enable(&self, enable: bool) {
        let mask = (PwmCtl::PWEN | PwmCtl::MSEN).for_channel(self.channel);
        self.update_ctl(mask, if enable { mask } else { 0 });
    }

    fn is_running(&self) -> bool {
        let sta = unsafe { read_volatile(addr_of!((*self.regs.as_ptr()).sta)) };
        sta & sta_running(self.channel) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformInfo;
    use crate::platform::bcm2835::scratch_map;

    #[test]
    fn controller_count_follows_generation() {
        let legacy = Bcm2835PwmProvider::new(scratch_map(PlatformInfo::new(0x3f00_0000, 0x0100_0000)));
        assert_eq!(legacy.controllers().len(), 1);
        assert!(legacy.controller(1).is_err());

        let pi4 = Bcm2835PwmProvider::new(scratch_map(PlatformInfo::new(0xfe00_0000, 0x0180_0000)));
        let controllers = pi4.controllers();
        assert_eq!(controllers.len(), 2);
        assert_eq!(controllers[1].key(), "bcm2835-pwm@0xfe20c800");
    }

    #[test]
    fn channel_bits_are_independent() {
        let provider = Bcm2835PwmProvider::new(scratch_map(PlatformInfo::new(0x2000_0000, 0x0100_0000)));
        let controller = provider.controller(0).unwrap();
        let ch0 = controller.open(0).unwrap();
        let ch1 = controller.open(1).unwrap();
        assert!(matches!(controller.open(2), Err(Error::InvalidArgument { .. })));

        ch1.set_polarity(Polarity::ActiveLow);
        ch1.enable(true);
        ch0.set_range(1024);
        ch0.set_data(256);

        assert_eq!(ch0.polarity(), Polarity::ActiveHigh);
        assert_eq!(ch1.polarity(), Polarity::ActiveLow);
        assert_eq!((ch0.range(), ch0.data()), (1024, 256));
        assert_eq!(ch1.range(), 0);

        let ctl = unsafe { read_volatile(addr_of!((*controller.regs.as_ptr()).ctl)) };
        assert_eq!(ctl, 0x9100);

        ch1.enable(false);
        ch1.set_polarity(Polarity::ActiveHigh);
        let ctl = unsafe { read_volatile(addr_of!((*controller.regs.as_ptr()).ctl)) };
        assert_eq!(ctl, 0);
        assert!(!ch1.is_running());
    }
}
