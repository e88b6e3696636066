use std::time::Duration;

/// Poll cadence and boot timing.
///
/// The boot timeout covers the audible relay click roughly six seconds after a power toggle plus
/// a margin; the settle time covers relay jitter on top of that.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Interval between the fast polls made right after startup.
    pub startup_interval: Duration,
    /// Number of fast startup polls before settling into the ON/OFF cadence.
    pub startup_polls: u32,
    pub on_interval: Duration,
    pub off_interval: Duration,
    /// Per-query timeout inside a poll cycle. Kept short so an unreachable receiver releases the
    /// connection slot quickly.
    pub query_timeout: Duration,
    /// Also poll direct mode, decode mode, audio format and sample rate while ON.
    pub poll_audio_attributes: bool,
    pub boot_timeout: Duration,
    pub power_off_window: Duration,
    pub boot_settle: Duration,
    pub volume_confirm_delay: Duration,
    pub source_confirm_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            startup_interval: Duration::from_secs(5),
            startup_polls: 3,
            on_interval: Duration::from_secs(30),
            off_interval: Duration::from_secs(60),
            query_timeout: Duration::from_secs(1),
            poll_audio_attributes: true,
            boot_timeout: Duration::from_secs(10),
            power_off_window: Duration::from_secs(5),
            boot_settle: Duration::from_secs(1),
            volume_confirm_delay: Duration::from_millis(300),
            source_confirm_delay: Duration::from_secs(1),
        }
    }
}

impl PollSettings {
    /// Delay between a power-on command and its dedicated verification poll.
    pub fn verification_delay(&self) -> Duration {
        self.boot_timeout + self.boot_settle
    }
}

// ================================================================================================
// Tests
