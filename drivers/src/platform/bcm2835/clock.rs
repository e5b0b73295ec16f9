//! BCM2835 Clock Manager Driver
//!
//! Programs the PCM, PWM and general purpose clock generators and decodes
//! the PLL frequencies they can be fed from.

use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile};
use std::thread;
use std::time::Duration;

use common::{Error, Result};

use super::PeripheralMap;
use crate::hw::bcm2835::PASSWORD;
use crate::hw::bcm2835::a2w::{
    A2wRegisters, PLL_CDIV_MASK, PLL_CTRL_NDIV_MASK, PLL_CTRL_PDIV_MASK, PLL_CTRL_PDIV_SHIFT,
    PLL_FRAC_BITS, PLL_FRAC_MASK, XOSC_CTRL_PLLAEN, XOSC_CTRL_PLLCEN, XOSC_CTRL_PLLDEN,
    XOSC_CTRL_PLLHEN,
};
use crate::hw::bcm2835::clock::{ClockCtl, ClockRegisters, divisor};
use crate::hw::bcm2835::pwm::PwmRegisters;

/// Settle time after each divisor and source change.
const SETTLE: Duration = Duration::from_micros(10);

/// Clock generator input.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockSource {
    Disabled = 0,
    Oscillator = 1,
    PllA = 4,
    PllC = 5,
    PllD = 6,
    /// HDMI auxiliary.
    PllH = 7,
}

impl ClockSource {
    pub const PLLS: [ClockSource; 4] = [
        ClockSource::PllA,
        ClockSource::PllC,
        ClockSource::PllD,
        ClockSource::PllH,
    ];

    /// Slot in the A2W per-PLL arrays.
    const fn pll_index(self) -> Option<usize> {
        match self {
            ClockSource::PllA => Some(0),
            ClockSource::PllC => Some(1),
            ClockSource::PllD => Some(2),
            ClockSource::PllH => Some(3),
            _ => None,
        }
    }

    const fn enable_bit(self) -> u32 {
        match self {
            ClockSource::PllA => XOSC_CTRL_PLLAEN,
            ClockSource::PllC => XOSC_CTRL_PLLCEN,
            ClockSource::PllD => XOSC_CTRL_PLLDEN,
            ClockSource::PllH => XOSC_CTRL_PLLHEN,
            _ => 0,
        }
    }
}

/// Clock generator to program.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockTarget {
    Pcm,
    Pwm,
    /// GPCLK0..=2.
    Gpio(u8),
}

/// Access to the clock manager and PLL configuration.
#[derive(Debug, Copy, Clone)]
pub struct ClockManager {
    map: &'static PeripheralMap,
}

impl ClockManager {
    pub const fn new(map: &'static PeripheralMap) -> Self {
        Self { map }
    }

    /// Clock manager of the running system.
    pub fn system() -> Self {
        Self::new(PeripheralMap::system())
    }

    /// Feed `target` from `source` divided by `integer_div + fract_div / 4096`.
    pub fn program_clock(
        &self,
        target: ClockTarget,
        source: ClockSource,
        integer_div: u32,
        fract_div: u32,
    ) -> Result<()> {
        self.program("ClockManager::program_clock", target, source, integer_div, fract_div)
    }

    /// Program the PWM clock. The configuration of PWM 0 is preserved.
    pub fn set_pwm_clock(&self, source: ClockSource, integer_div: u32, fract_div: u32) -> Result<()> {
        self.program("ClockManager::set_pwm_clock", ClockTarget::Pwm, source, integer_div, fract_div)
    }

    pub fn set_pcm_clock(&self, source: ClockSource, integer_div: u32, fract_div: u32) -> Result<()> {
        self.program("ClockManager::set_pcm_clock", ClockTarget::Pcm, source, integer_div, fract_div)
    }

    pub fn set_gpio_clock(
        &self,
        index: u8,
        source: ClockSource,
        integer_div: u32,
        fract_div: u32,
    ) -> Result<()> {
        self.program(
            "ClockManager::set_gpio_clock",
            ClockTarget::Gpio(index),
            source,
            integer_div,
            fract_div,
        )
    }

    /// Output frequency of `source` in Hz. A PLL that is switched off
    /// reports 0.
    pub fn query_frequency(&self, source: ClockSource) -> Result<u64> {
        let crystal = self.map.info().crystal_hz();
        let Some(idx) = source.pll_index() else {
            return Ok(match source {
                ClockSource::Oscillator => crystal,
                _ => 0,
            });
        };

        let a2w = self.map.get::<A2wRegisters>(0)?.as_ptr();
        let (xosc, ctrl, frac, cdiv) = unsafe {
            let cdiv = if source == ClockSource::PllH {
                read_volatile(addr_of!((*a2w).pllh_aux))
            } else {
                read_volatile(addr_of!((*a2w).pll_per[idx].val))
            };
            (
                read_volatile(addr_of!((*a2w).xosc_ctrl)),
                read_volatile(addr_of!((*a2w).pll_ctrl[idx].val)),
                read_volatile(addr_of!((*a2w).pll_frac[idx].val)),
                cdiv,
            )
        };

        if xosc & source.enable_bit() == 0 {
            return Ok(0);
        }

        let ndiv = u64::from(ctrl & PLL_CTRL_NDIV_MASK);
        let pdiv = u64::from((ctrl & PLL_CTRL_PDIV_MASK) >> PLL_CTRL_PDIV_SHIFT).max(1);
        let frac = u64::from(frac & PLL_FRAC_MASK);
        let cdiv = match u64::from(cdiv & PLL_CDIV_MASK) {
            0 => 256,
            n => n,
        };

        let vco = (crystal * ((ndiv << PLL_FRAC_BITS) + frac)) >> PLL_FRAC_BITS;
        Ok(vco / pdiv / cdiv)
    }

    fn program(
        &self,
        function: &'static str,
        target: ClockTarget,
        source: ClockSource,
        integer_div: u32,
        fract_div: u32,
    ) -> Result<()> {
        validate(function, target, integer_div, fract_div)?;

        let clk = self.map.get::<ClockRegisters>(0)?.as_ptr();
        let (ctl, div) = unsafe {
            match target {
                ClockTarget::Pcm => (addr_of_mut!((*clk).pcm.ctl), addr_of_mut!((*clk).pcm.div)),
                ClockTarget::Pwm => (addr_of_mut!((*clk).pwm.ctl), addr_of_mut!((*clk).pwm.div)),
                ClockTarget::Gpio(i) => {
                    let gp = addr_of_mut!((*clk).gp[usize::from(i)]);
                    (addr_of_mut!((*gp).ctl), addr_of_mut!((*gp).div))
                }
            }
        };

        // Reprogramming the PWM clock disturbs the PWM control register.
        let pwm = match target {
            ClockTarget::Pwm => {
                let pwm = self.map.get::<PwmRegisters>(0)?.as_ptr();
                Some((pwm, unsafe { read_volatile(addr_of!((*pwm).ctl)) }))
            }
            _ => None,
        };

        log::debug!("{target:?} <- {source:?} / {integer_div}.{fract_div}");
        unsafe { set_clock(ctl, div, source, integer_div, fract_div) };

        if let Some((pwm, saved)) = pwm {
            unsafe { write_volatile(addr_of_mut!((*pwm).ctl), saved) };
        }
        Ok(())
    }
}

fn validate(function: &'static str, target: ClockTarget, integer_div: u32, fract_div: u32) -> Result<()> {
    if let ClockTarget::Gpio(index) = target {
        if index > 2 {
            return Err(Error::invalid_argument(function, "index <= 2", index));
        }
    }
    if !(2..=256).contains(&integer_div) {
        return Err(Error::invalid_argument(function, "2 <= integer_div <= 256", integer_div));
    }
    if fract_div > 0xfff {
        return Err(Error::invalid_argument(function, "0 <= fract_div <= 4095", fract_div));
    }
    Ok(())
}

// ============================================================================
// Raw Hardware Functions
// ============================================================================

/// Reprogram one clock generator.
///
/// # Safety
///
/// `ctl` and `div` must point at a mapped control/divisor pair.
unsafe fn set_clock(ctl: *mut u32, div: *mut u32, source: ClockSource, divi: u32, divf: u32) {
    unsafe {
        // Kill the generator if busy; changing it while running glitches.
        if ClockCtl::from_bits_retain(read_volatile(ctl)).contains(ClockCtl::BUSY) {
            loop {
                write_volatile(ctl, PASSWORD | ClockCtl::KILL.bits());
                if !ClockCtl::from_bits_retain(read_volatile(ctl)).contains(ClockCtl::BUSY) {
                    break;
                }
            }
        }

        write_volatile(div, PASSWORD | divisor(divi, divf));
        thread::sleep(SETTLE);

        write_volatile(ctl, PASSWORD | source as u32);
        thread::sleep(SETTLE);

        let current = read_volatile(ctl);
        write_volatile(ctl, PASSWORD | current | ClockCtl::ENAB.bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformInfo;
    use crate::platform::bcm2835::scratch_map;

    fn legacy() -> ClockManager {
        ClockManager::new(scratch_map(PlatformInfo::new(0x2000_0000, 0x0100_0000)))
    }

    fn a2w(clock: &ClockManager) -> *mut A2wRegisters {
        clock.map.get::<A2wRegisters>(0).unwrap().as_ptr()
    }

    #[test]
    fn divisors_are_bounds_checked_for_every_target() {
        let clock = legacy();
        let targets = [ClockTarget::Pcm, ClockTarget::Pwm, ClockTarget::Gpio(0), ClockTarget::Gpio(2)];
        for target in targets {
            for (divi, divf) in [(1, 0), (257, 0), (2, 4096)] {
                let err = clock
                    .program_clock(target, ClockSource::PllD, divi, divf)
                    .unwrap_err();
                match err {
                    Error::InvalidArgument { function, expected, actual } => {
                        assert_eq!(function, "ClockManager::program_clock");
                        assert!(expected.contains("div"));
                        assert!(actual == divi.to_string() || actual == divf.to_string());
                    }
                    other => panic!("unexpected error {other:?}"),
                }
            }
        }
        assert!(clock.set_gpio_clock(3, ClockSource::PllD, 2, 0).is_err());
    }

    #[test]
    fn pcm_clock_registers_carry_password() {
        let clock = legacy();
        clock.set_pcm_clock(ClockSource::PllD, 5, 100).unwrap();

        let clk = clock.map.get::<ClockRegisters>(0).unwrap().as_ptr();
        let (ctl, div) = unsafe {
            (read_volatile(addr_of!((*clk).pcm.ctl)), read_volatile(addr_of!((*clk).pcm.div)))
        };
        assert_eq!(div, PASSWORD | (5 << 12) | 100);
        assert_eq!(ctl, PASSWORD | ClockCtl::ENAB.bits() | ClockSource::PllD as u32);
    }

    #[test]
    fn pwm_clock_restores_pwm_control() {
        let clock = legacy();
        let pwm = clock.map.get::<PwmRegisters>(0).unwrap().as_ptr();
        unsafe { write_volatile(addr_of_mut!((*pwm).ctl), 0x81) };

        clock.set_pwm_clock(ClockSource::Oscillator, 2, 0).unwrap();

        assert_eq!(unsafe { read_volatile(addr_of!((*pwm).ctl)) }, 0x81);
        let clk = clock.map.get::<ClockRegisters>(0).unwrap().as_ptr();
        assert_eq!(unsafe { read_volatile(addr_of!((*clk).pwm.div)) }, PASSWORD | (2 << 12));
    }

    #[test]
    fn generic_pwm_target_saves_pwm_control() {
        use crate::hw::bcm2835::PeripheralKind;
        use crate::platform::bcm2835::{PeripheralMap, ScratchMemory};

        let memory: &'static ScratchMemory = Box::leak(Box::new(ScratchMemory::new()));
        let map: &'static PeripheralMap = Box::leak(Box::new(PeripheralMap::new(
            PlatformInfo::new(0x2000_0000, 0x0100_0000),
            memory,
        )));
        let clock = ClockManager::new(map);

        clock.program_clock(ClockTarget::Pcm, ClockSource::Oscillator, 2, 0).unwrap();
        let pwm_block = map.physical_address(PeripheralKind::Pwm, 0);
        assert!(!memory.mappings().contains(&pwm_block));

        clock.program_clock(ClockTarget::Pwm, ClockSource::Oscillator, 2, 0).unwrap();
        assert!(memory.mappings().contains(&pwm_block));

        let pwm = map.get::<PwmRegisters>(0).unwrap().as_ptr();
        unsafe { write_volatile(addr_of_mut!((*pwm).ctl), 0x2d) };
        clock.program_clock(ClockTarget::Pwm, ClockSource::PllD, 5, 0).unwrap();
        assert_eq!(unsafe { read_volatile(addr_of!((*pwm).ctl)) }, 0x2d);
    }

    #[test]
    fn fixed_sources() {
        let clock = legacy();
        assert_eq!(clock.query_frequency(ClockSource::Disabled).unwrap(), 0);
        assert_eq!(clock.query_frequency(ClockSource::Oscillator).unwrap(), 19_200_000);

        let pi4 = ClockManager::new(scratch_map(PlatformInfo::new(0xfe00_0000, 0x0180_0000)));
        assert_eq!(pi4.query_frequency(ClockSource::Oscillator).unwrap(), 54_000_000);
    }

    #[test]
    fn disabled_pll_reports_zero() {
        let clock = legacy();
        let r = a2w(&clock);
        unsafe {
            write_volatile(addr_of_mut!((*r).pll_ctrl[2].val), 26);
            write_volatile(addr_of_mut!((*r).pll_per[2].val), 4);
        }
        assert_eq!(clock.query_frequency(ClockSource::PllD).unwrap(), 0);
    }

    #[test]
    fn plld_frequency() {
        let clock = legacy();
        let r = a2w(&clock);
        unsafe {
            write_volatile(addr_of_mut!((*r).xosc_ctrl), XOSC_CTRL_PLLDEN);
            write_volatile(addr_of_mut!((*r).pll_ctrl[2].val), (1 << PLL_CTRL_PDIV_SHIFT) | 26);
            write_volatile(addr_of_mut!((*r).pll_frac[2].val), 0x20000);
            write_volatile(addr_of_mut!((*r).pll_per[2].val), 4);
        }
        assert_eq!(clock.query_frequency(ClockSource::PllD).unwrap(), 125_400_000);
    }

    #[test]
    fn pllh_divides_by_aux_channel() {
        let clock = legacy();
        let r = a2w(&clock);
        unsafe {
            write_volatile(addr_of_mut!((*r).xosc_ctrl), XOSC_CTRL_PLLHEN);
            write_volatile(addr_of_mut!((*r).pll_ctrl[3].val), 100);
            write_volatile(addr_of_mut!((*r).pllh_aux), 10);
        }
        // pdiv 0 counts as 1.
        assert_eq!(clock.query_frequency(ClockSource::PllH).unwrap(), 192_000_000);
    }

    #[test]
    fn zero_channel_divisor_means_256() {
        let clock = legacy();
        let r = a2w(&clock);
        unsafe {
            write_volatile(addr_of_mut!((*r).xosc_ctrl), XOSC_CTRL_PLLAEN);
            write_volatile(addr_of_mut!((*r).pll_ctrl[0].val), 256);
        }
        assert_eq!(clock.query_frequency(ClockSource::PllA).unwrap(), 19_200_000);
    }
}
