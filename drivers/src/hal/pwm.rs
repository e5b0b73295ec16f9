//! PWM capability interfaces.

use common::Result;

/// Output polarity of a channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// One PWM output.
///
/// Register level operations cannot fail once the channel is open.
pub trait PwmChannelProvider: Send + Sync {
    fn channel(&self) -> u32;

    fn range(&self) -> u32;
    fn set_range(&self, range: u32);

    fn data(&self) -> u32;
    fn set_data(&self, data: u32);

    fn polarity(&self) -> Polarity;
    fn set_polarity(&self, polarity: Polarity);

    /// Start or stop the channel.
    fn enable(&self, enable: bool);

    /// Whether the channel is currently transmitting.
    fn is_running(&self) -> bool;
}

/// One PWM controller and its channel index space.
pub trait PwmControllerProvider: Send + Sync {
    fn open(&self, channel: u32) -> Result<Box<dyn PwmChannelProvider>>;
    /// Identifies the hardware behind this controller.
    fn key(&self) -> String;
    fn name(&self) -> String;
    fn count(&self) -> u32;
}

/// Enumerates the PWM controllers of one backend.
pub trait PwmProvider: Send + Sync {
    fn controllers(&self) -> Vec<Box<dyn PwmControllerProvider>>;

    fn controllers_named(&self, name: &str) -> Vec<Box<dyn PwmControllerProvider>> {
        self.controllers()
            .into_iter()
            .filter(|c| c.name() == name)
            .collect()
    }
}
