//! Log identity.
//!
//! Every talus log is identified by an opaque 16 byte [`LogId`]. The textual
//! form used in storage paths is the hyphenated UUID rendering under a
//! literal `tenant/` segment, chosen so that all paths for one log share a
//! single lexical prefix.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The path segment that introduces a log's identity in storage paths.
pub const TENANT_SEGMENT: &str = "tenant/";

/// A 16 byte opaque identifier for a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogId([u8; 16]);

impl LogId {
    /// Creates a log id from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a log id from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }

    /// True when every byte is zero. Nil ids are rejected wherever a log
    /// must be selected.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns the UUID rendering of the id.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    /// Returns the `tenant/<uuid>` path segment for this log.
    #[must_use]
    pub fn tenant_segment(&self) -> String {
        format!("{TENANT_SEGMENT}{}", self.as_uuid())
    }

    /// Recovers a log id from any storage path containing a `tenant/<uuid>`
    /// segment.
    ///
    /// Returns `None` when no tenant segment is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when a tenant segment is present but
    /// the identity does not parse as a UUID.
    pub fn from_tenant_path(path: &str) -> Result<Option<Self>> {
        let Some(at) = path.find(TENANT_SEGMENT) else {
            return Ok(None);
        };
        let rest = &path[at + TENANT_SEGMENT.len()..];
        let identity = rest.split('/').next().unwrap_or(rest);
        let uuid =
            Uuid::parse_str(identity).map_err(|_| Error::InvalidPath(path.to_string()))?;
        Ok(Some(Self::from_uuid(uuid)))
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_uuid())
    }
}

impl FromStr for LogId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self::from_uuid)
            .map_err(|e| Error::InvalidInput(format!("invalid log id '{s}': {e}")))
    }
}

impl From<[u8; 16]> for LogId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

// Log ids serialize as their UUID string so that reports and configuration
// stay human readable.
impl Serialize for LogId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
