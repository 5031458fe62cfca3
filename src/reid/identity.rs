use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::Embedding;

/// Durable identity identifier, e.g. `ID_007`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the id for sequence number `n` under `prefix`.
    pub fn numbered(prefix: &str, n: u64) -> Self {
        Self(format!("{prefix}_{n:03}"))
    }

    /// Sequence number of an id minted under `prefix`, if it was.
    pub fn sequence(&self, prefix: &str) -> Option<u64> {
        self.0
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|n| n.parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Gallery entry as exchanged with a durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryRecord {
    pub embedding: Embedding,
    /// `None` when the store has no usable timestamp for the entry
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Cached identity held by the feature bank.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub identity_id: IdentityId,
    /// Representative embedding, a moving average of confirmed matches
    pub embedding: Embedding,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Identity {
    pub(crate) fn from_record(identity_id: IdentityId, record: GalleryRecord) -> Self {
        Self {
            identity_id,
            embedding: record.embedding,
            last_seen: record.last_seen,
        }
    }

    pub fn to_record(&self) -> GalleryRecord {
        GalleryRecord {
            embedding: self.embedding.clone(),
            last_seen: self.last_seen,
        }
    }
}
