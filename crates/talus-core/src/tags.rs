//! Blob tag schema.
//!
//! Two tags are required on every massif blob: `firstindex` carries the
//! massif's first MMR index, `lastid` the most recent id timestamp appended
//! into it. Values are hex encoded because tag indexes only sort lexically,
//! and zero padded hex sorts the same way the numbers do.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Tag key for the massif's first MMR index.
pub const TAG_KEY_FIRST_INDEX: &str = "firstindex";

/// Tag key for the most recently appended id timestamp.
pub const TAG_KEY_LAST_ID: &str = "lastid";

/// Blob tag map. Ordered so that rendered tag sets are deterministic.
pub type TagMap = BTreeMap<String, String>;

/// Reads the `firstindex` tag.
///
/// # Errors
///
/// Returns [`Error::MissingTag`] when the tag is absent and the hex decoding
/// errors otherwise.
pub fn get_first_index(tags: &TagMap) -> Result<u64> {
    let value = tags
        .get(TAG_KEY_FIRST_INDEX)
        .ok_or(Error::MissingTag(TAG_KEY_FIRST_INDEX))?;
    decode_hex64(value)
}

/// Sets the `firstindex` tag, zero padded to preserve lexical sorting.
pub fn set_first_index(tags: &mut TagMap, first_index: u64) {
    tags.insert(TAG_KEY_FIRST_INDEX.to_string(), encode_hex64(first_index));
}

/// Reads the `lastid` tag, returning the empty string when absent.
#[must_use]
pub fn get_last_id_hex(tags: &TagMap) -> &str {
    tags.get(TAG_KEY_LAST_ID).map_or("", String::as_str)
}

/// Encodes a value as 16-wide big endian lowercase hex.
#[must_use]
pub fn encode_hex64(value: u64) -> String {
    format!("{value:016x}")
}

/// Decodes a big endian hex tag value.
///
/// # Errors
///
/// Returns [`Error::Hex64Overflow`] when the value holds more than 8 bytes of
/// data, and [`Error::InvalidInput`] when it is empty or not hex at all.
pub fn decode_hex64(value: &str) -> Result<u64> {
    let bytes = hex::decode(value)
        .map_err(|e| Error::InvalidInput(format!("bad hex64 tag value '{value}': {e}")))?;
    if bytes.len() > 8 {
        return Err(Error::Hex64Overflow(value.to_string()));
    }
    if bytes.is_empty() {
        return Err(Error::InvalidInput("empty hex64 tag value".into()));
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(&bytes);
    Ok(u64::from_be_bytes(buf))
}
