//! Helper functions.

use crate::queries::MAX_VOLUME;

/// Convert a native receiver volume (0-99) to a level between 0.0 and 1.0, rounded to two
/// decimal places.
pub(crate) fn volume_level(native: u8) -> f32 {
    let level = f32::from(native.min(MAX_VOLUME)) / f32::from(MAX_VOLUME);

    (level * 100.0).round() / 100.0
}

/// Convert a level between 0.0 and 1.0 to a native receiver volume (truncating). Levels outside
/// that range (including NaN) are rejected.
pub(crate) fn native_volume(level: f32) -> Result<u8, String> {
    if !(0.0..=1.0).contains(&level) {
        return Err(format!("{} is outside 0.0..=1.0", level));
    }

    Ok((level * f32::from(MAX_VOLUME)) as u8)
}

// ================================================================================================
// Tests
