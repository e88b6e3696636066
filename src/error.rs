use thiserror::Error;

use crate::protocol::FrameError;

/// A failed Link-level exchange. Never escapes the crate: callers only see [`CommandFailure`].
#[derive(Error, Debug)]
pub(crate) enum LinkError {
    /// Writing the request frame failed
    #[error("write failed for command 0x{code:02X}: {source}")]
    Write { code: u8, source: std::io::Error },

    /// No usable response frame arrived
    #[error("no response to command 0x{code:02X}: {source}")]
    NoResponse { code: u8, source: FrameError },

    /// The receiver answered with a non-OK status byte
    #[error("receiver refused command 0x{code:02X} (answer 0x{answer:02X})")]
    Refused { code: u8, answer: u8 },
}

/// Why a receiver command did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    /// Could not connect to the receiver
    #[error("receiver unreachable")]
    Unreachable,

    /// Connected, but the exchange failed on the wire
    #[error("transport failure: {0}")]
    Transport(String),

    /// The receiver rejected the command
    #[error("receiver refused command 0x{code:02X} (answer 0x{answer:02X})")]
    Refused { code: u8, answer: u8 },

    /// The requested source is neither a configured display name nor a physical input
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// The requested volume level is outside 0.0..=1.0
    #[error("invalid volume level: {0}")]
    InvalidVolume(String),
}

impl From<LinkError> for CommandFailure {
    fn from(error: LinkError) -> Self {
        match error {
            LinkError::Refused { code, answer } => CommandFailure::Refused { code, answer },
            other => CommandFailure::Transport(other.to_string()),
        }
    }
}

// ================================================================================================
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_link_error_keeps_status() {
        let failure: CommandFailure = LinkError::Refused {
            code: 0x08,
            answer: 0x85,
        }
        .into();

        assert_eq!(
            failure,
            CommandFailure::Refused {
                code: 0x08,
                answer: 0x85
            }
        );
        assert_eq!(
            failure.to_string(),
            "receiver refused command 0x08 (answer 0x85)"
        );
    }

    #[test]
    fn transport_link_error_is_flattened() {
        let failure: CommandFailure = LinkError::NoResponse {
            code: 0x0D,
            source: FrameError::Timeout,
        }
        .into();

        assert_eq!(
            failure,
            CommandFailure::Transport(
                "no response to command 0x0D: no complete frame within the timeout".to_string()
            )
        );
    }
}
