//! Hardware-defined enumerations: physical inputs and the audio attribute lookup tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A physical input on the receiver.
///
/// Each input has an RC5 function code (used to select it) and one or more source codes (as
/// reported by the current-source status query).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Input {
    Bd,
    Cd,
    Stb,
    Av,
    Sat,
    Pvr,
    Game,
    Vcr,
    Aux,
    Radio,
    Net,
    Usb,
    Display,
}

impl Input {
    /// Every physical input, in the receiver's front-panel order.
    pub const ALL: [Input; 13] = [
        Input::Bd,
        Input::Cd,
        Input::Stb,
        Input::Av,
        Input::Sat,
        Input::Pvr,
        Input::Game,
        Input::Vcr,
        Input::Aux,
        Input::Radio,
        Input::Net,
        Input::Usb,
        Input::Display,
    ];

    /// The input's physical name, as printed on the receiver.
    pub const fn name(&self) -> &'static str {
        match self {
            Input::Bd => "BD",
            Input::Cd => "CD",
            Input::Stb => "STB",
            Input::Av => "AV",
            Input::Sat => "SAT",
            Input::Pvr => "PVR",
            Input::Game => "GAME",
            Input::Vcr => "VCR",
            Input::Aux => "AUX",
            Input::Radio => "RADIO",
            Input::Net => "NET",
            Input::Usb => "USB",
            Input::Display => "DISPLAY",
        }
    }

    /// RC5 function code which selects this input.
    pub const fn rc5_code(&self) -> u8 {
        match self {
            Input::Bd => 0x62,
            Input::Cd => 0x76,
            Input::Stb => 0x64,
            Input::Av => 0x5E,
            Input::Sat => 0x1B,
            Input::Pvr => 0x60,
            Input::Game => 0x61,
            Input::Vcr => 0x77,
            Input::Aux => 0x63,
            Input::Radio => 0x5B,
            Input::Net => 0x5C,
            Input::Usb => 0x5D,
            Input::Display => 0x3A,
        }
    }

    /// Map a current-source status code to an input. FM and DAB both report as `RADIO`.
    pub const fn from_source_code(code: u8) -> Option<Input> {
        match code {
            0x01 => Some(Input::Cd),
            0x02 => Some(Input::Bd),
            0x03 => Some(Input::Av),
            0x04 => Some(Input::Sat),
            0x05 => Some(Input::Pvr),
            0x06 => Some(Input::Vcr),
            0x08 => Some(Input::Aux),
            0x09 => Some(Input::Display),
            0x0B | 0x0C => Some(Input::Radio),
            0x0E => Some(Input::Net),
            0x0F => Some(Input::Usb),
            0x10 => Some(Input::Stb),
            0x11 => Some(Input::Game),
            _ => None,
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Input {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Input::ALL
            .iter()
            .find(|input| input.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("Unknown input: {}", s))
    }
}

/// The source reported by the receiver. Codes outside the known table are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Input(Input),
    Unknown(u8),
}

impl From<u8> for Source {
    fn from(code: u8) -> Self {
        match Input::from_source_code(code) {
            Some(input) => Source::Input(input),
            None => Source::Unknown(code),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Source::Input(input) => write!(f, "{}", input),
            Source::Unknown(code) => write!(f, "{}", unknown_code(*code)),
        }
    }
}

/// Fallback rendering for codes missing from a lookup table.
pub fn unknown_code(code: u8) -> String {
    format!("UNKNOWN_0x{:02X}", code)
}

/// Incoming audio stream format (first data byte of the audio format query).
pub fn audio_format_name(code: u8) -> Option<&'static str> {
    let name = match code {
        0x00 => "PCM",
        0x01 => "Analogue Direct",
        0x02 => "Dolby Digital",
        0x03 => "Dolby Digital EX",
        0x04 => "Dolby Digital Surround",
        0x05 => "Dolby Digital Plus",
        0x06 => "Dolby TrueHD",
        0x07 => "DTS",
        0x08 => "DTS 96/24",
        0x09 => "DTS ES Matrix",
        0x0A => "DTS ES Discrete",
        0x0B => "DTS ES Matrix 96/24",
        0x0C => "DTS ES Discrete 96/24",
        0x0D => "DTS-HD Master Audio",
        0x0E => "DTS-HD High Res Audio",
        0x0F => "DTS Low Bit Rate",
        0x10 => "DTS Core",
        0x13 => "PCM Zero",
        0x14 => "Unsupported",
        0x15 => "Undetected",
        0x16 => "Dolby Atmos",
        0x17 => "DTS:X",
        0x18 => "IMAX Enhanced",
        0x19 => "Auro 3D",
        _ => return None,
    };

    Some(name)
}

/// Decode mode applied to two-channel sources.
pub fn decode_mode_2ch_name(code: u8) -> Option<&'static str> {
    let name = match code {
        0x01 => "Stereo",
        0x04 => "Dolby Surround",
        0x07 => "Neo:6 Cinema",
        0x08 => "Neo:6 Music",
        0x09 => "5/7 Ch Stereo",
        0x0A => "DTS Neural:X",
        0x0C => "DTS Virtual:X",
        0x0D => "Dolby Virtual Height",
        0x0E => "Auro Native",
        0x0F => "Auro-Matic 3D",
        0x10 => "Auro 2D",
        _ => return None,
    };

    Some(name)
}

/// Decode mode applied to multichannel sources.
pub fn decode_mode_mch_name(code: u8) -> Option<&'static str> {
    let name = match code {
        0x01 => "Stereo down-mix",
        0x02 => "Multi-channel",
        0x03 => "Dolby D EX/DTS-ES",
        0x06 => "Dolby Surround",
        0x0C => "DTS Neural:X",
        0x0D => "DTS Virtual:X",
        0x0E => "Dolby Virtual Height",
        0x0F => "Auro Native",
        0x10 => "Auro-Matic 3D",
        0x11 => "Auro 2D",
        _ => return None,
    };

    Some(name)
}

/// Incoming sample rate.
pub fn sample_rate_name(code: u8) -> Option<&'static str> {
    let name = match code {
        0x00 => "32 kHz",
        0x01 => "44.1 kHz",
        0x02 => "48 kHz",
        0x03 => "88.2 kHz",
        0x04 => "96 kHz",
        0x05 => "176.4 kHz",
        0x06 => "192 kHz",
        0x07 => "Unknown",
        0x08 => "Undetected",
        _ => return None,
    };

    Some(name)
}

// ================================================================================================
// Tests
