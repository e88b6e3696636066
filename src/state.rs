use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::codes::Source;
use crate::helpers::volume_level;
use crate::input_mapping::InputMapping;

/// Receiver power. `Unknown` until the first confirmed reading.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PowerState {
    On,
    Off,
    #[default]
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Last-known receiver state, as held by the controller.
///
/// Values are only ever replaced by newer readings or optimistic command results. A failed query
/// leaves the previous value in place; staleness is tracked separately.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ObservedState {
    pub power: PowerState,
    pub is_ready: bool,
    pub volume: Option<u8>,
    pub is_muted: Option<bool>,
    pub source: Option<Source>,
    pub audio_format: Option<String>,
    pub decode_mode: Option<String>,
    pub sample_rate: Option<String>,
    pub is_direct_mode: Option<bool>,
    pub last_successful_poll: Option<Instant>,
}

impl ObservedState {
    pub fn snapshot(&self, inputs: &InputMapping, now: Instant) -> ReceiverState {
        ReceiverState {
            power: self.power,
            is_ready: self.is_ready,
            volume: self.volume,
            volume_level: self.volume.map(volume_level),
            is_muted: self.is_muted,
            source: self.source.map(|source| inputs.display_name(source)),
            audio_format: self.audio_format.clone(),
            decode_mode: self.decode_mode.clone(),
            sample_rate: self.sample_rate.clone(),
            is_direct_mode: self.is_direct_mode,
            staleness: self
                .last_successful_poll
                .map(|polled_at| now.saturating_duration_since(polled_at)),
        }
    }
}

/// Read-only snapshot of the managed receiver's state, for presentation.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ReceiverState {
    pub power: PowerState,
    /// Whether the receiver has finished booting after a power-on.
    pub is_ready: bool,
    /// Native volume (0-99).
    pub volume: Option<u8>,
    /// Volume between 0.0 and 1.0.
    pub volume_level: Option<f32>,
    pub is_muted: Option<bool>,
    /// Display name of the current source (custom name when one is configured).
    pub source: Option<String>,
    pub audio_format: Option<String>,
    pub decode_mode: Option<String>,
    pub sample_rate: Option<String>,
    pub is_direct_mode: Option<bool>,
    /// Time since the last poll whose power query succeeded.
    pub staleness: Option<Duration>,
}

impl ReceiverState {
    /// Same receiver readings, ignoring how old they are.
    pub(crate) fn same_readings(&self, other: &ReceiverState) -> bool {
        let unaged = |state: &ReceiverState| ReceiverState {
            staleness: None,
            ..state.clone()
        };

        unaged(self) == unaged(other)
    }
}

// ================================================================================================
// Tests
