//! Heartbeat ingestion: decode a packet and apply it to the store.
//!
//! First heartbeat for a (grouping key, hostname) pair inserts a record;
//! every later one overwrites it. Either way the record comes out online.

use pulse_core::{DecodeError, Heartbeat, HeartbeatPacket};

use crate::record::{RecordId, ServiceRecord};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted(RecordId),
    Updated(RecordId),
}

impl IngestOutcome {
    pub fn record_id(&self) -> RecordId {
        match *self {
            IngestOutcome::Inserted(id) | IngestOutcome::Updated(id) => id,
        }
    }
}

/// Why a packet left the store untouched. Never fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("update failed: {0}")]
    Update(#[from] StoreError),
}

#[derive(Clone, Default)]
pub struct Ingestor {
    store: RecordStore,
}

impl Ingestor {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Decode one framed packet and apply it.
    pub fn ingest(&self, packet: &[u8]) -> Result<IngestOutcome, IngestError> {
        let packet = HeartbeatPacket::decode(packet)?;
        self.apply(packet.payload)
    }

    /// Apply an already decoded heartbeat.
    pub fn apply(&self, heartbeat: Heartbeat) -> Result<IngestOutcome, IngestError> {
        let record = ServiceRecord::online(heartbeat);

        let mut store = self.store.lock();
        if !store.exists(record.grouping_key(), record.hostname()) {
            let id = store.insert(record);
            drop(store);
            tracing::debug!(%id, "new service registered");
            Ok(IngestOutcome::Inserted(id))
        } else {
            let id = store.upsert(record)?;
            Ok(IngestOutcome::Updated(id))
        }
    }
}
