//! Record store: the registry's single piece of shared mutable state.
//!
//! Records live in a `BTreeMap` keyed by their store-assigned identity, so a
//! full scan always comes back in insertion order. A secondary index keyed
//! by grouping key and then hostname makes the per-heartbeat lookup a pair of
//! hash lookups instead of a scan.
//!
//! One mutex guards records and index together. Each method on
//! [`RecordStore`] is one critical section. Callers that need check-then-act
//! (ingestion, liveness sweeps) take a [`StoreGuard`] with [`RecordStore::lock`]
//! and run the whole sequence under it. Never hold a guard across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::record::{RecordId, RecordKey, ServiceRecord};

/// Fleet status report: grouping key → records sharing it.
pub type FleetStatus = BTreeMap<String, Vec<ServiceRecord>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no record for {0}")]
    NotFound(RecordKey),
}

/// Record totals for operator summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub records: usize,
    pub online: usize,
    pub offline: usize,
    pub groups: usize,
}

#[derive(Default)]
struct StoreInner {
    records: BTreeMap<RecordId, ServiceRecord>,
    /// grouping_key → hostname → id
    index: HashMap<String, HashMap<String, RecordId>>,
    next_id: u64,
}

/// In-memory indexed collection of service records. Cheap to clone; all
/// clones share the same records.
#[derive(Clone, Default)]
pub struct RecordStore {
    inner: Arc<Mutex<StoreInner>>,
}

/// Exclusive access to the store for a sequence of operations.
pub struct StoreGuard<'a> {
    inner: MutexGuard<'a, StoreInner>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the store lock. A poisoned lock is recovered: every mutation
    /// below leaves records and index consistent before it can panic.
    pub fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            inner: self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn exists(&self, grouping_key: &str, hostname: &str) -> bool {
        self.lock().exists(grouping_key, hostname)
    }

    pub fn insert(&self, record: ServiceRecord) -> RecordId {
        self.lock().insert(record)
    }

    pub fn find_one(&self, grouping_key: &str, hostname: &str) -> Option<ServiceRecord> {
        self.lock().find_one(grouping_key, hostname).cloned()
    }

    pub fn upsert(&self, record: ServiceRecord) -> Result<RecordId, StoreError> {
        self.lock().upsert(record)
    }

    pub fn all(&self) -> Vec<ServiceRecord> {
        self.lock().all()
    }

    pub fn group_by_key(&self) -> FleetStatus {
        self.lock().group_by_key()
    }

    /// Records of a single grouping key, in insertion order.
    pub fn group(&self, grouping_key: &str) -> Vec<ServiceRecord> {
        self.lock().group(grouping_key)
    }

    pub fn counts(&self) -> StoreCounts {
        self.lock().counts()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoreGuard<'_> {
    pub fn exists(&self, grouping_key: &str, hostname: &str) -> bool {
        self.lookup(grouping_key, hostname).is_some()
    }

    /// Add a new record and assign its identity.
    ///
    /// Uniqueness is the caller's job: check [`exists`](Self::exists) under
    /// the same guard first. Inserting a pair that is already present leaves
    /// the older record unreachable by key.
    pub fn insert(&mut self, mut record: ServiceRecord) -> RecordId {
        let id = RecordId::from_raw(self.inner.next_id);
        self.inner.next_id += 1;
        record.id = Some(id);

        let previous = self
            .inner
            .index
            .entry(record.grouping_key().to_string())
            .or_default()
            .insert(record.hostname().to_string(), id);
        if let Some(previous) = previous {
            tracing::warn!(
                key = %record.key(),
                %previous,
                %id,
                "insert shadowed an existing record"
            );
        }

        self.inner.records.insert(id, record);
        id
    }

    pub fn find_one(&self, grouping_key: &str, hostname: &str) -> Option<&ServiceRecord> {
        let id = self.lookup(grouping_key, hostname)?;
        self.inner.records.get(&id)
    }

    /// Overwrite every field of the stored record for this pair with the
    /// supplied values. The stored identity is kept; the supplied record's
    /// identity (if any) is ignored. An unknown pair changes nothing.
    pub fn upsert(&mut self, record: ServiceRecord) -> Result<RecordId, StoreError> {
        let id = self
            .lookup(record.grouping_key(), record.hostname())
            .ok_or_else(|| StoreError::NotFound(record.key()))?;
        let current = self
            .inner
            .records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(record.key()))?;

        let ServiceRecord {
            heartbeat, online, ..
        } = record;
        current.heartbeat = heartbeat;
        current.online = online;
        Ok(id)
    }

    /// Full scan in insertion order.
    pub fn all(&self) -> Vec<ServiceRecord> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.inner.records.values()
    }

    pub fn group_by_key(&self) -> FleetStatus {
        let mut fleet = FleetStatus::new();
        for record in self.iter() {
            fleet
                .entry(record.grouping_key().to_string())
                .or_default()
                .push(record.clone());
        }
        fleet
    }

    pub fn group(&self, grouping_key: &str) -> Vec<ServiceRecord> {
        self.iter()
            .filter(|r| r.grouping_key() == grouping_key)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> StoreCounts {
        let online = self.iter().filter(|r| r.online).count();
        let records = self.len();
        StoreCounts {
            records,
            online,
            offline: records - online,
            groups: self.inner.index.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    fn lookup(&self, grouping_key: &str, hostname: &str) -> Option<RecordId> {
        self.inner
            .index
            .get(grouping_key)
            .and_then(|hosts| hosts.get(hostname))
            .copied()
    }
}
