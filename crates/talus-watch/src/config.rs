//! Watch configuration.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use talus_core::error::{Error, Result};
use talus_core::{idtimestamp, LogId};

/// Default poll interval between filter rounds.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default horizon. The store promises tag index consistency within
/// "seconds"; a minute of slack keeps slowly indexed writes visible.
pub const DEFAULT_HORIZON: Duration = Duration::from_secs(60);

/// Sentinel reported when a log has no checkpoint tail.
pub const SEAL_ID_NOT_FOUND: &str = "NOT-FOUND";

// Horizon forced when neither horizon nor since were given explicitly.
const FALLBACK_HORIZON: Duration = Duration::from_secs(30);

/// Configuration for a watch run.
///
/// Precedence of the anchoring knobs: `latest` beats an explicit `id_since`,
/// which beats `since`, which is derived from `horizon` when only a horizon
/// is given. At least one of them must be provided.
#[derive(Debug, Clone, Default)]
pub struct WatchConfig {
    /// Watch from the beginning of time: every tagged blob matches.
    pub latest: bool,
    /// Wall clock anchor for the first filter.
    pub since: Option<DateTime<Utc>>,
    /// Explicit id timestamp anchor for the first filter, as sortable hex.
    pub id_since: Option<String>,
    /// Sliding window; subsequent filters anchor to `now - horizon`.
    pub horizon: Option<Duration>,
    /// Sleep between polls.
    pub interval: Option<Duration>,
    /// Number of polls before giving up with no changes.
    pub watch_count: usize,
    /// When present, only these logs are reported.
    pub watch_logs: Option<HashSet<LogId>>,
    /// Prefix prepended to blob paths to form report URLs.
    pub object_prefix_url: String,
    /// Commitment epoch used when deriving id anchors from wall time.
    pub commitment_epoch: u8,
}

/// A validated watch configuration with every anchor resolved.
#[derive(Debug, Clone)]
pub struct ResolvedWatchConfig {
    /// See [`WatchConfig::latest`].
    pub latest: bool,
    /// The resolved wall clock anchor.
    pub since: DateTime<Utc>,
    /// The resolved id timestamp anchor.
    pub id_since: String,
    /// The sliding window, when one applies.
    pub horizon: Option<Duration>,
    /// The poll interval. Never zero.
    pub interval: Duration,
    /// Number of polls; at least 1.
    pub watch_count: usize,
    /// See [`WatchConfig::watch_logs`].
    pub watch_logs: Option<HashSet<LogId>>,
    /// See [`WatchConfig::object_prefix_url`].
    pub object_prefix_url: String,
    /// See [`WatchConfig::commitment_epoch`].
    pub commitment_epoch: u8,
}

impl WatchConfig {
    /// Applies the defaulting rules and resolves the anchors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no anchoring knob was provided
    /// or an explicit `id_since` does not parse.
    pub fn resolve(self) -> Result<ResolvedWatchConfig> {
        if !self.latest
            && self.since.is_none()
            && self.id_since.is_none()
            && self.horizon.is_none()
        {
            return Err(Error::InvalidInput(
                "provide the latest flag, a horizon on its own, or either of the since parameters"
                    .into(),
            ));
        }

        let interval = match self.interval {
            Some(d) if !d.is_zero() => d,
            _ => DEFAULT_INTERVAL,
        };
        let epoch = if self.commitment_epoch == 0 {
            1
        } else {
            self.commitment_epoch
        };

        // An explicit horizon trumps since; the fallback horizon trumps only
        // an unset since.
        let explicit_horizon = self.horizon;
        let horizon = explicit_horizon.unwrap_or(FALLBACK_HORIZON);

        let (since, id_since) = if let Some(id_since) = self.id_since {
            // derive since from the provided anchor so reports stay human
            let (id, id_epoch) = idtimestamp::split_hex(&id_since)?;
            let since = idtimestamp::time_of(id, id_epoch).ok_or_else(|| {
                Error::InvalidInput(format!("id since '{id_since}' is out of range"))
            })?;
            (since, id_since)
        } else {
            // the horizon anchors the first filter only when since is unset;
            // subsequent filters advance with the horizon regardless
            let since = match self.since {
                Some(since) => since,
                None => Utc::now() - chrono_duration(horizon)?,
            };
            (since, idtimestamp::hex_from_time(since, epoch))
        };

        Ok(ResolvedWatchConfig {
            latest: self.latest,
            since,
            id_since,
            horizon: explicit_horizon.or(if self.latest { None } else { Some(horizon) }),
            interval,
            watch_count: self.watch_count.max(1),
            watch_logs: self.watch_logs,
            object_prefix_url: self.object_prefix_url,
            commitment_epoch: epoch,
        })
    }
}

pub(crate) fn chrono_duration(d: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(d)
        .map_err(|e| Error::InvalidInput(format!("duration out of range: {e}")))
}
