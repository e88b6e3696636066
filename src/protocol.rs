//! Lexicon RS232/IP frame codec.
//!
//! The receiver speaks a small fixed-structure binary protocol over TCP. Requests sent to the
//! receiver look like:
//!
//! ```text
//! <Start 0x21> <Zone> <Command> <DataLen> <Data...> <End 0x0D>
//! ```
//!
//! Responses (and unsolicited status frames pushed by the receiver) carry an additional answer
//! byte:
//!
//! ```text
//! <Start 0x21> <Zone> <Command> <Answer> <DataLen> <Data...> <End 0x0D>
//! ```
//!
//! Encoding is pure. Decoding reads exactly one frame from an async byte stream using the
//! declared data length (header first, then exactly `DataLen + 1` further bytes), so a read can
//! never split or merge frames.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const FRAME_START: u8 = 0x21;
pub const FRAME_END: u8 = 0x0D;
pub const ZONE_MAIN: u8 = 0x01;
pub const QUERY_REQUEST: u8 = 0xF0;
pub const ANSWER_OK: u8 = 0x00;
pub const RC5_SYSTEM: u8 = 0x10;

const REQUEST_HEADER_LEN: usize = 4;
const RESPONSE_HEADER_LEN: usize = 5;

// ------------------------------------------------------------------------------------------------
// Command codes

/// Protocol command codes (the third byte of every frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Power,
    SimulateRc5,
    Volume,
    Mute,
    DirectMode,
    DecodeMode2Ch,
    DecodeModeMultiChannel,
    CurrentSource,
    AudioFormat,
    SampleRate,
}

impl CommandCode {
    pub const fn code(&self) -> u8 {
        match self {
            CommandCode::Power => 0x00,
            CommandCode::SimulateRc5 => 0x08,
            CommandCode::Volume => 0x0D,
            CommandCode::Mute => 0x0E,
            CommandCode::DirectMode => 0x0F,
            CommandCode::DecodeMode2Ch => 0x10,
            CommandCode::DecodeModeMultiChannel => 0x11,
            CommandCode::CurrentSource => 0x1D,
            CommandCode::AudioFormat => 0x43,
            CommandCode::SampleRate => 0x44,
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.code())
    }
}

/// RC5 infrared function codes, sent with [`CommandCode::SimulateRc5`].
///
/// The receiver only exposes a power *toggle*; there is no reliable discrete on/off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rc5Command {
    PowerToggle,
    VolumeUp,
    VolumeDown,
    MuteToggle,
    MuteOn,
    MuteOff,
    /// Select an input, using the input's RC5 function code.
    SelectInput(u8),
}

impl Rc5Command {
    pub const fn code(&self) -> u8 {
        match self {
            Rc5Command::PowerToggle => 0x0C,
            Rc5Command::VolumeUp => 0x10,
            Rc5Command::VolumeDown => 0x11,
            Rc5Command::MuteToggle => 0x0D,
            Rc5Command::MuteOn => 0x1A,
            Rc5Command::MuteOff => 0x78,
            Rc5Command::SelectInput(code) => *code,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Frames

/// Which of the two frame layouts is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Client-to-receiver frame (no answer byte).
    Request,
    /// Receiver-to-client frame, solicited or not (has an answer byte).
    Response,
}

impl FrameKind {
    const fn header_len(&self) -> usize {
        match self {
            FrameKind::Request => REQUEST_HEADER_LEN,
            FrameKind::Response => RESPONSE_HEADER_LEN,
        }
    }
}

/// One decoded frame. `answer` is only present on response frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub zone: u8,
    pub code: u8,
    pub answer: Option<u8>,
    pub data: Vec<u8>,
}

impl Frame {
    /// Whether the receiver reported success. Request frames are always considered ok.
    pub fn is_ok(&self) -> bool {
        self.answer.map_or(true, |answer| answer == ANSWER_OK)
    }

    /// Encode this frame back into wire bytes (layout chosen by the presence of `answer`).
    pub fn encode(&self) -> Vec<u8> {
        match self.answer {
            Some(answer) => encode_response(self.zone, self.code, answer, &self.data),
            None => encode_command(self.zone, self.code, &self.data),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex(&self.encode()))
    }
}

/// Frame decode failures.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("no complete frame within the timeout")]
    Timeout,
    #[error("invalid frame start: 0x{0:02X}")]
    BadStart(u8),
    #[error("invalid frame end: 0x{0:02X}")]
    BadEnd(u8),
    #[error("connection closed mid-frame")]
    Closed,
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for FrameError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::Closed,
            _ => FrameError::Io(error),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Encoding

/// Encode a request frame. The caller guarantees `payload` fits the one-byte length field.
pub fn encode_command(zone: u8, code: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= u8::MAX as usize);

    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + payload.len() + 1);
    frame.extend_from_slice(&[FRAME_START, zone, code, payload.len() as u8]);
    frame.extend_from_slice(payload);
    frame.push(FRAME_END);

    frame
}

/// Encode a status query: a request frame carrying the single "request current value" byte.
pub fn encode_query(code: CommandCode) -> Vec<u8> {
    encode_command(ZONE_MAIN, code.code(), &[QUERY_REQUEST])
}

/// Encode a simulated RC5 remote-control key press.
pub fn encode_rc5(command: Rc5Command) -> Vec<u8> {
    encode_command(
        ZONE_MAIN,
        CommandCode::SimulateRc5.code(),
        &[RC5_SYSTEM, command.code()],
    )
}

/// Encode a response frame (as sent by the receiver).
pub fn encode_response(zone: u8, code: u8, answer: u8, data: &[u8]) -> Vec<u8> {
    debug_assert!(data.len() <= u8::MAX as usize);

    let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + data.len() + 1);
    frame.extend_from_slice(&[FRAME_START, zone, code, answer, data.len() as u8]);
    frame.extend_from_slice(data);
    frame.push(FRAME_END);

    frame
}

// ------------------------------------------------------------------------------------------------
// Decoding

/// Read exactly one frame of the given `kind` from `reader`.
///
/// Fails with [`FrameError::Timeout`] if no complete frame arrives within `timeout`, and with
/// [`FrameError::BadStart`]/[`FrameError::BadEnd`] if the markers are wrong (the frame is
/// discarded).
pub async fn read_frame<R>(
    reader: &mut R,
    kind: FrameKind,
    timeout: Duration,
) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, read_frame_unbounded(reader, kind)).await {
        Ok(result) => result,
        Err(_) => Err(FrameError::Timeout),
    }
}

async fn read_frame_unbounded<R>(reader: &mut R, kind: FrameKind) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let header_len = kind.header_len();
    let mut header = [0u8; RESPONSE_HEADER_LEN];
    let header = &mut header[..header_len];

    reader.read_exact(header).await?;

    if header[0] != FRAME_START {
        return Err(FrameError::BadStart(header[0]));
    }

    // Data bytes plus the end marker
    let data_len = header[header_len - 1] as usize;
    let mut data = vec![0u8; data_len + 1];
    reader.read_exact(&mut data).await?;

    match data.pop() {
        Some(FRAME_END) => {}
        Some(other) => return Err(FrameError::BadEnd(other)),
        None => return Err(FrameError::Closed),
    }

    Ok(Frame {
        zone: header[1],
        code: header[2],
        answer: match kind {
            FrameKind::Request => None,
            FrameKind::Response => Some(header[3]),
        },
        data,
    })
}

/// Lowercase hex rendering of wire bytes, for logging.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

// ================================================================================================
// Tests
