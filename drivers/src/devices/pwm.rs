//! PWM controllers and channels.

use std::sync::Arc;

use common::Result;

use super::{AccessRegistry, Slot};
use crate::device_manager;
use crate::hal::pwm::{Polarity, PwmChannelProvider, PwmControllerProvider, PwmProvider};

static CHANNELS: AccessRegistry = AccessRegistry::new();

/// An opened PWM channel.
pub struct PwmChannel {
    provider: Box<dyn PwmChannelProvider>,
    _slot: Slot,
}

impl PwmChannel {
    pub fn channel(&self) -> u32 {
        self.provider.channel()
    }

    /// Counts per period.
    pub fn range(&self) -> u32 {
        self.provider.range()
    }

    pub fn set_range(&self, range: u32) {
        self.provider.set_range(range);
    }

    /// Active counts per period.
    pub fn data(&self) -> u32 {
        self.provider.data()
    }

    pub fn set_data(&self, data: u32) {
        self.provider.set_data(data);
    }

    pub fn polarity(&self) -> Polarity {
        self.provider.polarity()
    }

    pub fn set_polarity(&self, polarity: Polarity) {
        self.provider.set_polarity(polarity);
    }

    pub fn enable(&self, enable: bool) {
        self.provider.enable(enable);
    }

    pub fn is_running(&self) -> bool {
        self.provider.is_running()
    }
}

/// One PWM controller.
pub struct PwmController {
    provider: Box<dyn PwmControllerProvider>,
}

impl PwmController {
    pub fn new(provider: Box<dyn PwmControllerProvider>) -> Self {
        Self { provider }
    }

    /// The controller chosen by the process-wide default provider.
    pub fn system_default() -> Result<Self> {
        device_manager::default_provider().pwm_controller().map(Self::new)
    }

    pub fn open(&self, channel: u32) -> Result<Arc<PwmChannel>> {
        let key = self.provider.key();
        let slot = CHANNELS.claim(&key, channel)?;
        let provider = self.provider.open(channel)?;
        log::debug!("opened channel {channel} on {key}");
        Ok(Arc::new(PwmChannel {
            provider,
            _slot: slot,
        }))
    }

    pub fn try_open(&self, channel: u32) -> Option<Arc<PwmChannel>> {
        self.open(channel).ok()
    }

    pub fn key(&self) -> String {
        self.provider.key()
    }

    pub fn name(&self) -> String {
        self.provider.name()
    }

    pub fn count(&self) -> u32 {
        self.provider.count()
    }
}

pub fn controllers(provider: &dyn PwmProvider) -> Vec<PwmController> {
    provider.controllers().into_iter().map(PwmController::new).collect()
}

pub fn controllers_named(provider: &dyn PwmProvider, name: &str) -> Vec<PwmController> {
    provider
        .controllers_named(name)
        .into_iter()
        .map(PwmController::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformInfo;
    use crate::platform::bcm2835::{Bcm2835PwmProvider, scratch_map};
    use common::Error;

    #[test]
    fn channels_are_exclusive() {
        let provider = Bcm2835PwmProvider::new(scratch_map(PlatformInfo::new(0x2000_0000, 0x0100_0000)));
        let controller = controllers(&provider).remove(0);
        assert_eq!(controller.count(), 2);

        let ch0 = controller.open(0).unwrap();
        assert!(matches!(controller.open(0), Err(Error::AccessViolation)));
        let ch1 = controller.try_open(1).unwrap();

        ch1.set_range(100);
        ch1.set_data(25);
        assert_eq!((ch1.range(), ch1.data()), (100, 25));
        assert_eq!(ch0.range(), 0);

        drop(ch0);
        assert!(controller.try_open(0).is_some());
    }

    #[test]
    fn named_lookup_matches_controller_name() {
        let provider = Bcm2835PwmProvider::new(scratch_map(PlatformInfo::new(0xfe00_0000, 0x0180_0000)));
        let named = controllers_named(&provider, "Direct register PWM controller 1");
        assert_eq!(named.len(), 1);
        assert!(named[0].key().ends_with("c800"));
    }
}
