//! Snowflake id timestamps.
//!
//! Every committed entry carries a 64 bit id whose high bits encode the
//! milliseconds since the start of a commitment epoch. The hex rendering
//! prefixes the epoch byte so that lexical order over the rendered strings
//! agrees with (epoch, id) order; blob tag indexes only support lexical
//! comparison.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Number of low bits reserved for generator-local sequencing; the remaining
/// high bits carry the millisecond offset from the epoch start.
pub const TIME_SHIFT: u32 = 20;

/// Length of the hex rendering: two epoch chars followed by sixteen id chars.
pub const HEX_LEN: usize = 18;

// Each commitment epoch spans the unsigned 32 bit unix second range; epoch 1
// begins at the unix epoch.
const EPOCH_SPAN_SECONDS: i64 = 1 << 32;

/// Unix milliseconds at which the given commitment epoch begins.
#[must_use]
pub fn epoch_unix_ms(epoch: u8) -> i64 {
    (i64::from(epoch) - 1) * EPOCH_SPAN_SECONDS * 1000
}

/// Renders an id timestamp with its epoch byte as a lexically sortable hex
/// string.
#[must_use]
pub fn to_hex(id: u64, epoch: u8) -> String {
    format!("{epoch:02x}{id:016x}")
}

/// Splits a hex rendering produced by [`to_hex`] back into `(id, epoch)`.
///
/// # Errors
///
/// Returns [`Error::Hex64Overflow`] when the value is too long to hold a 64
/// bit id, and [`Error::InvalidInput`] on any other malformed input.
pub fn split_hex(value: &str) -> Result<(u64, u8)> {
    if value.len() > HEX_LEN {
        return Err(Error::Hex64Overflow(value.to_string()));
    }
    if value.len() != HEX_LEN {
        return Err(Error::InvalidInput(format!(
            "id timestamp hex must be {HEX_LEN} chars, got '{value}'"
        )));
    }
    let epoch = u8::from_str_radix(&value[..2], 16)
        .map_err(|e| Error::InvalidInput(format!("bad epoch in '{value}': {e}")))?;
    let id = u64::from_str_radix(&value[2..], 16)
        .map_err(|e| Error::InvalidInput(format!("bad id in '{value}': {e}")))?;
    Ok((id, epoch))
}

/// Builds the id timestamp for a wall clock instant, with zeroed sequence
/// bits.
#[must_use]
pub fn from_time(t: DateTime<Utc>, epoch: u8) -> u64 {
    let ms = t.timestamp_millis().saturating_sub(epoch_unix_ms(epoch));
    u64::try_from(ms.max(0)).unwrap_or(0) << TIME_SHIFT
}

/// Renders the id timestamp for a wall clock instant as sortable hex.
#[must_use]
pub fn hex_from_time(t: DateTime<Utc>, epoch: u8) -> String {
    to_hex(from_time(t, epoch), epoch)
}

/// Unix milliseconds encoded by an id timestamp.
#[must_use]
pub fn unix_ms(id: u64, epoch: u8) -> i64 {
    let offset = i64::try_from(id >> TIME_SHIFT).unwrap_or(i64::MAX);
    epoch_unix_ms(epoch).saturating_add(offset)
}

/// Wall clock instant encoded by an id timestamp.
#[must_use]
pub fn time_of(id: u64, epoch: u8) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(unix_ms(id, epoch))
}
