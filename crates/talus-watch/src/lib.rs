//! # talus-watch
//!
//! Poll based activity monitor for talus massif logs.
//!
//! Discovers recently modified logs across many logs by filtering on the
//! `lastid` blob tag server-side, then collates the newest massif and
//! checkpoint per log into one activity record each. The tag index is
//! eventually consistent, so the watcher's role is discovery only — anything
//! that matters is re-read through the storage engine, which checks tags
//! directly against the blobs.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod activity;
pub mod collator;
pub mod config;
pub mod watcher;

pub use activity::{last_activity_rfc3339, LogActivity};
pub use collator::{LogTail, LogTailCollator};
pub use config::{
    ResolvedWatchConfig, WatchConfig, DEFAULT_HORIZON, DEFAULT_INTERVAL, SEAL_ID_NOT_FOUND,
};
pub use watcher::{collect_pages, render_report, Watcher};
