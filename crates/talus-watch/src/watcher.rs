//! The watch loop.
//!
//! Watches for log changes by polling the store's tag filter with a
//! `lastid` floor, collating every page of each round, and reporting one
//! record per active log. Terminates on the first round that finds
//! anything; a bounded number of empty rounds ends with
//! [`Error::NoChanges`].

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use talus_core::error::{Error, Result};
use talus_core::paths::ObjectKind;
use talus_core::store::{last_id_filter, TagFilter};
use talus_core::idtimestamp;

use crate::activity::{last_activity_rfc3339, LogActivity};
use crate::collator::LogTailCollator;
use crate::config::{chrono_duration, ResolvedWatchConfig, WatchConfig, SEAL_ID_NOT_FOUND};

/// Poll based activity watcher.
///
/// Owns its RNG: emitted records are shuffled per instance so that lexically
/// late logs are not starved when consumers process reports in order under
/// load.
pub struct Watcher {
    cfg: ResolvedWatchConfig,
    rng: StdRng,
    /// The wall clock anchor of the most recent filter, for reporting.
    pub last_since: DateTime<Utc>,
    /// The id anchor of the most recent filter, for reporting.
    pub last_id_since: String,
}

impl Watcher {
    /// Creates a watcher from a configuration.
    ///
    /// # Errors
    ///
    /// Propagates the configuration defaulting errors.
    pub fn new(cfg: WatchConfig) -> Result<Self> {
        let cfg = cfg.resolve()?;
        Ok(Self {
            last_since: cfg.since,
            last_id_since: cfg.id_since.clone(),
            cfg,
            rng: StdRng::from_entropy(),
        })
    }

    /// The resolved configuration this watcher runs with.
    #[must_use]
    pub fn config(&self) -> &ResolvedWatchConfig {
        &self.cfg
    }

    /// The filter expression for the first round, anchored to the resolved
    /// `id_since`.
    pub fn first_filter(&mut self) -> String {
        if self.cfg.latest {
            return last_id_filter(&idtimestamp::to_hex(0, 0));
        }
        self.last_since = self.cfg.since;
        self.last_id_since = self.cfg.id_since.clone();
        last_id_filter(&self.cfg.id_since)
    }

    /// The filter expression for subsequent rounds, advanced to
    /// `now - horizon` when a horizon applies.
    pub fn next_filter(&mut self) -> String {
        let Some(horizon) = self.cfg.horizon.filter(|_| !self.cfg.latest) else {
            return self.first_filter();
        };
        let Ok(horizon) = chrono_duration(horizon) else {
            return self.first_filter();
        };
        self.last_since = Utc::now() - horizon;
        self.last_id_since =
            idtimestamp::hex_from_time(self.last_since, self.cfg.commitment_epoch);
        last_id_filter(&self.last_id_since)
    }

    /// Watches for log changes according to the configuration.
    ///
    /// Returns the activity records of the first round that found any,
    /// shuffled for fairness. Each record pairs the newest massif of a log
    /// with its newest checkpoint, or the `NOT-FOUND` sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoChanges`] when every round came back empty or the
    /// cancellation token fired first.
    pub async fn watch_for_changes<S: TagFilter + ?Sized>(
        &mut self,
        store: &S,
        collator: &mut LogTailCollator,
        cancel: &CancellationToken,
    ) -> Result<Vec<LogActivity>> {
        let mut tags_filter = self.first_filter();
        let mut count = self.cfg.watch_count;

        loop {
            collect_pages(store, collator, &tags_filter).await?;

            let mut activity = Vec::new();
            for tail in collator.tails(ObjectKind::MassifData) {
                if let Some(watched) = &self.cfg.watch_logs {
                    if !watched.contains(&tail.log_id) {
                        continue;
                    }
                }

                let seal = collator.tail(&tail.log_id, ObjectKind::Checkpoint);
                let seal_last_id = seal.map_or(SEAL_ID_NOT_FOUND, |s| s.last_id.as_str());

                activity.push(LogActivity {
                    log_id: tail.log_id,
                    massif: tail.index,
                    id_committed: tail.last_id.clone(),
                    id_confirmed: seal_last_id.to_string(),
                    last_modified: last_activity_rfc3339(&tail.last_id, seal_last_id),
                    massif_url: format!("{}{}", self.cfg.object_prefix_url, tail.path),
                    checkpoint_url: seal
                        .map(|s| format!("{}{}", self.cfg.object_prefix_url, s.path))
                        .unwrap_or_default(),
                });
            }

            if !activity.is_empty() {
                tracing::info!(
                    active = activity.len(),
                    sealed = collator.tails(ObjectKind::Checkpoint).len(),
                    since = %self.last_since,
                    id_since = %self.last_id_since,
                    "log activity found"
                );
                activity.shuffle(&mut self.rng);
                return Ok(activity);
            }

            if count <= 1 {
                return Err(Error::NoChanges);
            }
            count -= 1;
            tags_filter = self.next_filter();

            tokio::select! {
                () = cancel.cancelled() => return Err(Error::NoChanges),
                () = tokio::time::sleep(self.cfg.interval) => {}
            }
        }
    }
}

/// Collects every page of a single filter invocation into the collator.
pub async fn collect_pages<S: TagFilter + ?Sized>(
    store: &S,
    collator: &mut LogTailCollator,
    tags_filter: &str,
) -> Result<()> {
    let mut marker: Option<String> = None;
    loop {
        let page = store.filter_by_tag(tags_filter, marker.take()).await?;
        collator.collate_page(&page.items)?;
        marker = page.marker;
        if marker.is_none() {
            return Ok(());
        }
    }
}

/// Renders activity records the way the console reporter does.
///
/// # Errors
///
/// Returns a serialization failure as [`Error::InvalidInput`].
pub fn render_report(activity: &[LogActivity]) -> Result<String> {
    serde_json::to_string_pretty(activity)
        .map_err(|e| Error::InvalidInput(format!("unreportable activity: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn latest_watcher() -> Watcher {
        Watcher::new(WatchConfig {
            latest: true,
            ..WatchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn latest_mode_anchors_to_zero() {
        let mut w = latest_watcher();
        assert_eq!(w.first_filter(), "\"lastid\">='000000000000000000'");
        assert_eq!(w.next_filter(), "\"lastid\">='000000000000000000'");
    }

    #[test]
    fn first_filter_uses_the_configured_anchor() {
        let anchor = "01000000000012345678".to_string();
        // 18 chars required
        let anchor = anchor[..18].to_string();
        let mut w = Watcher::new(WatchConfig {
            id_since: Some(anchor.clone()),
            ..WatchConfig::default()
        })
        .unwrap();
        assert_eq!(w.first_filter(), format!("\"lastid\">='{anchor}'"));
    }

    #[test]
    fn next_filter_advances_with_the_horizon() {
        let mut w = Watcher::new(WatchConfig {
            horizon: Some(Duration::from_secs(60)),
            ..WatchConfig::default()
        })
        .unwrap();
        let first = w.first_filter();
        let next = w.next_filter();
        // both are floors around now - horizon; the second is not older
        assert!(next >= first, "{next} < {first}");
    }
}
