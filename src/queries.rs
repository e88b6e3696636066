//! Typed status queries.
//!
//! Each query is a single request/response exchange over a lent [`Link`]. A `None` result means
//! the query failed for any reason (timeout, refusal, short payload); callers keep their cached
//! value in that case.

use std::time::Duration;

use log::debug;

use crate::codes::{
    audio_format_name, decode_mode_2ch_name, decode_mode_mch_name, sample_rate_name, unknown_code,
    Source,
};
use crate::gate::Link;
use crate::protocol::CommandCode;
use crate::state::PowerState;

pub const MAX_VOLUME: u8 = 99;

// ------------------------------------------------------------------------------------------------
// Payload decoders

pub(crate) fn decode_power(data: &[u8]) -> Option<PowerState> {
    data.first().map(|&value| match value {
        0x01 => PowerState::On,
        _ => PowerState::Off,
    })
}

pub(crate) fn decode_volume(data: &[u8]) -> Option<u8> {
    data.first().map(|&value| value.min(MAX_VOLUME))
}

/// The receiver reports 0x00 for muted and 0x01 for not muted.
pub(crate) fn decode_mute(data: &[u8]) -> Option<bool> {
    data.first().map(|&value| value == 0x00)
}

pub(crate) fn decode_direct_mode(data: &[u8]) -> Option<bool> {
    data.first().map(|&value| value == 0x01)
}

pub(crate) fn decode_source(data: &[u8]) -> Option<Source> {
    data.first().map(|&value| Source::from(value))
}

/// Audio format responses carry the format and the channel configuration. Only the format is
/// used, but a response missing the second byte is treated as malformed.
pub(crate) fn decode_audio_format(data: &[u8]) -> Option<String> {
    match data {
        [format, _channels, ..] => Some(lookup_or_unknown(*format, audio_format_name)),
        _ => None,
    }
}

pub(crate) fn decode_sample_rate(data: &[u8]) -> Option<String> {
    data.first()
        .map(|&value| lookup_or_unknown(value, sample_rate_name))
}

fn lookup_or_unknown(code: u8, lookup: fn(u8) -> Option<&'static str>) -> String {
    lookup(code)
        .map(String::from)
        .unwrap_or_else(|| unknown_code(code))
}

// ------------------------------------------------------------------------------------------------
// Queries

pub async fn query_power(link: &mut Link, timeout: Duration) -> Option<PowerState> {
    let data = link.send_query(CommandCode::Power, timeout).await?;
    decode_power(&data)
}

pub async fn query_volume(link: &mut Link, timeout: Duration) -> Option<u8> {
    let data = link.send_query(CommandCode::Volume, timeout).await?;
    decode_volume(&data)
}

pub async fn query_mute(link: &mut Link, timeout: Duration) -> Option<bool> {
    let data = link.send_query(CommandCode::Mute, timeout).await?;
    decode_mute(&data)
}

pub async fn query_source(link: &mut Link, timeout: Duration) -> Option<Source> {
    let data = link.send_query(CommandCode::CurrentSource, timeout).await?;
    let source = decode_source(&data)?;
    debug!("Current source: {}", source);

    Some(source)
}

pub async fn query_direct_mode(link: &mut Link, timeout: Duration) -> Option<bool> {
    let data = link.send_query(CommandCode::DirectMode, timeout).await?;
    decode_direct_mode(&data)
}

/// The two-channel decode table is tried first; a miss there (or a failed query) falls back to
/// the multichannel table.
pub async fn query_decode_mode(link: &mut Link, timeout: Duration) -> Option<String> {
    if let Some(data) = link.send_query(CommandCode::DecodeMode2Ch, timeout).await {
        if let Some(name) = data.first().and_then(|&code| decode_mode_2ch_name(code)) {
            return Some(name.to_string());
        }
    }

    let data = link
        .send_query(CommandCode::DecodeModeMultiChannel, timeout)
        .await?;

    data.first()
        .map(|&code| lookup_or_unknown(code, decode_mode_mch_name))
}

pub async fn query_audio_format(link: &mut Link, timeout: Duration) -> Option<String> {
    let data = link.send_query(CommandCode::AudioFormat, timeout).await?;
    decode_audio_format(&data)
}

pub async fn query_sample_rate(link: &mut Link, timeout: Duration) -> Option<String> {
    let data = link.send_query(CommandCode::SampleRate, timeout).await?;
    decode_sample_rate(&data)
}

// ================================================================================================
// Tests
