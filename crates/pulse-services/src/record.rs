//! Service records: the unit of registry state.

use std::fmt;

use pulse_core::Heartbeat;
use serde::Serialize;

/// Store-assigned identity of a record. Opaque outside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The (grouping key, hostname) pair that uniquely identifies a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub grouping_key: String,
    pub hostname: String,
}

impl RecordKey {
    pub fn new(grouping_key: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            grouping_key: grouping_key.into(),
            hostname: hostname.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.grouping_key, self.hostname)
    }
}

/// A service instance as the registry sees it: the last accepted heartbeat
/// plus the registry-maintained `online` flag.
///
/// Serializes flat, in the same shape as a heartbeat payload with `online`
/// added. The identity is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    #[serde(skip)]
    pub(crate) id: Option<RecordId>,
    #[serde(flatten)]
    pub heartbeat: Heartbeat,
    pub online: bool,
}

impl ServiceRecord {
    /// A not-yet-stored record for a freshly received heartbeat.
    pub fn online(heartbeat: Heartbeat) -> Self {
        Self {
            id: None,
            heartbeat,
            online: true,
        }
    }

    /// Identity assigned by the store; `None` until inserted.
    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn grouping_key(&self) -> &str {
        &self.heartbeat.grouping_key
    }

    pub fn hostname(&self) -> &str {
        self.heartbeat.hostname()
    }

    pub fn service_name(&self) -> &str {
        &self.heartbeat.service_name
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.grouping_key(), self.hostname())
    }
}
