//! Activity records and last-activity derivation.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

use talus_core::{idtimestamp, LogId};

use crate::config::SEAL_ID_NOT_FOUND;

/// One emitted record per active log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActivity {
    /// The active log.
    pub log_id: LogId,
    /// Index of the newest massif seen for the log.
    pub massif: u32,
    /// `lastid` of the newest massif: the last entry committed.
    pub id_committed: String,
    /// `lastid` of the newest checkpoint, or `NOT-FOUND` when the log has
    /// no seal in the window.
    pub id_confirmed: String,
    /// RFC 3339 UTC rendering of the later of the two activity times.
    pub last_modified: String,
    /// URL of the newest massif blob.
    pub massif_url: String,
    /// URL of the newest checkpoint blob; empty when the seal was not found.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checkpoint_url: String,
}

/// Derives the last activity time from the massif and seal id timestamps,
/// rendered RFC 3339 in UTC.
///
/// The massif id is required; a missing or malformed seal id falls back to
/// the massif time, and a malformed massif id yields the empty string.
#[must_use]
pub fn last_activity_rfc3339(id_massif: &str, id_seal: &str) -> String {
    let Some(t_massif) = activity_time(id_massif) else {
        return String::new();
    };
    let latest = if id_seal == SEAL_ID_NOT_FOUND {
        t_massif
    } else {
        match activity_time(id_seal) {
            Some(t_seal) if t_seal > t_massif => t_seal,
            _ => t_massif,
        }
    };
    latest.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn activity_time(id_hex: &str) -> Option<DateTime<chrono::Utc>> {
    let (id, epoch) = idtimestamp::split_hex(id_hex).ok()?;
    idtimestamp::time_of(id, epoch)
}
