//! Receiver control commands.
//!
//! Each command maps to one gated operation against the receiver. See
//! [`crate::LexiconController::send`].

use std::fmt;

/// Receiver control commands.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ReceiverCommand {
    /// Turn on the receiver (power toggle, only sent when not already on).
    TurnOn,
    /// Turn off the receiver (power toggle, only sent when not already off).
    TurnOff,
    /// Increase the volume by one step.
    VolumeUp,
    /// Decrease the volume by one step.
    VolumeDown,
    /// Set the volume level (0.0 to 1.0).
    SetVolume(f32),
    /// Set the mute state (`true` is muted, `false` is not muted).
    SetMute(bool),
    /// Select a source by display name or physical input name.
    SelectSource(String),
}

impl fmt::Display for ReceiverCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReceiverCommand::SetVolume(val) => write!(f, "SetVolume({})", val),
            ReceiverCommand::SetMute(val) => write!(f, "SetMute({})", val),
            ReceiverCommand::SelectSource(val) => write!(f, "SelectSource({})", val),
            variant => write!(f, "{:?}", variant),
        }
    }
}

// ================================================================================================
// Tests

#[cfg(test)]
mod tests {
    use super::ReceiverCommand;

    #[test]
    fn receiver_command_display() {
        assert_eq!(ReceiverCommand::TurnOn.to_string(), "TurnOn");
        assert_eq!(ReceiverCommand::TurnOff.to_string(), "TurnOff");
        assert_eq!(ReceiverCommand::VolumeUp.to_string(), "VolumeUp");
        assert_eq!(ReceiverCommand::VolumeDown.to_string(), "VolumeDown");
        assert_eq!(ReceiverCommand::SetVolume(0.5).to_string(), "SetVolume(0.5)");
        assert_eq!(ReceiverCommand::SetMute(true).to_string(), "SetMute(true)");
        assert_eq!(
            ReceiverCommand::SelectSource("DAB".into()).to_string(),
            "SelectSource(DAB)"
        );
    }
}
