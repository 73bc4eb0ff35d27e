//! Connection lifecycle: per-connection bookkeeping and the end-of-connection
//! liveness sweep.
//!
//! Transports call [`ConnectionManager::open`] once a connection is usable,
//! [`ConnectionManager::on_packet`] for every framed packet, and
//! [`ConnectionManager::on_end`] exactly once when the connection is over,
//! however it ended. `on_end` runs the sweep before it returns.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::Clock;
use crate::ingest::{IngestError, IngestOutcome, Ingestor};
use crate::liveness::{LivenessEvaluator, SweepReport};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct ConnectionState {
    peer: SocketAddr,
    transport: &'static str,
    opened_at: Instant,
    packets_accepted: u64,
    packets_rejected: u64,
}

/// Snapshot of one open connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub transport: &'static str,
    pub open_secs: u64,
    pub packets_accepted: u64,
    pub packets_rejected: u64,
}

struct ManagerInner {
    ingestor: Ingestor,
    evaluator: LivenessEvaluator,
    clock: Arc<dyn Clock>,
    connections: DashMap<ConnectionId, ConnectionState>,
    next_id: AtomicU64,
    completed: AtomicU64,
}

/// Shared by every connection task. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(store: RecordStore, evaluator: LivenessEvaluator, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                ingestor: Ingestor::new(store),
                evaluator,
                clock,
                connections: DashMap::new(),
                next_id: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &RecordStore {
        self.inner.ingestor.store()
    }

    pub fn open(&self, peer: SocketAddr, transport: &'static str) -> ConnectionId {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.connections.insert(
            id,
            ConnectionState {
                peer,
                transport,
                opened_at: Instant::now(),
                packets_accepted: 0,
                packets_rejected: 0,
            },
        );
        tracing::debug!(connection = %id, %peer, transport, "client connected");
        id
    }

    /// Ingest one packet. Failures are logged and returned; they never end
    /// the connection.
    pub fn on_packet(&self, id: ConnectionId, packet: &[u8]) -> Result<IngestOutcome, IngestError> {
        let result = self.inner.ingestor.ingest(packet);
        match &result {
            Ok(outcome) => {
                self.bump(id, true);
                tracing::trace!(connection = %id, ?outcome, "heartbeat applied");
            }
            Err(e) => {
                self.bump(id, false);
                tracing::warn!(connection = %id, error = %e, "dropped heartbeat");
            }
        }
        result
    }

    /// Count a packet the transport discarded before ingestion (e.g. oversized).
    pub fn on_rejected(&self, id: ConnectionId, reason: &str) {
        self.bump(id, false);
        tracing::warn!(connection = %id, reason, "dropped heartbeat");
    }

    /// Connection is over. Forget it, count it, and sweep the whole store.
    pub fn on_end(&self, id: ConnectionId) -> SweepReport {
        let state = self.inner.connections.remove(&id).map(|(_, s)| s);
        let total = self.inner.completed.fetch_add(1, Ordering::Relaxed) + 1;

        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(&self.store().group_by_key()) {
                Ok(fleet) => tracing::debug!(%fleet, "fleet status"),
                Err(e) => tracing::debug!(error = %e, "failed to render fleet status"),
            }
        }
        match state {
            Some(s) => tracing::debug!(
                connection = %id,
                peer = %s.peer,
                accepted = s.packets_accepted,
                rejected = s.packets_rejected,
                open_ms = s.opened_at.elapsed().as_millis() as u64,
                total_connections = total,
                "client disconnected"
            ),
            None => tracing::debug!(
                connection = %id,
                total_connections = total,
                "client disconnected"
            ),
        }

        self.sweep_now()
    }

    /// Run a liveness sweep at the clock's current time.
    pub fn sweep_now(&self) -> SweepReport {
        let now = self.inner.clock.now_secs();
        let report = self.inner.evaluator.sweep(self.store(), now);
        if report.went_offline > 0 || report.unevaluable > 0 {
            tracing::info!(
                examined = report.examined,
                went_offline = report.went_offline,
                unevaluable = report.unevaluable,
                "liveness sweep"
            );
        }
        report
    }

    pub fn completed_connections(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut list: Vec<ConnectionInfo> = self
            .inner
            .connections
            .iter()
            .map(|e| {
                let s = e.value();
                ConnectionInfo {
                    id: *e.key(),
                    peer: s.peer,
                    transport: s.transport,
                    open_secs: s.opened_at.elapsed().as_secs(),
                    packets_accepted: s.packets_accepted,
                    packets_rejected: s.packets_rejected,
                }
            })
            .collect();
        list.sort_by_key(|c| c.id.0);
        list
    }

    fn bump(&self, id: ConnectionId, accepted: bool) {
        if let Some(mut state) = self.inner.connections.get_mut(&id) {
            if accepted {
                state.packets_accepted += 1;
            } else {
                state.packets_rejected += 1;
            }
        }
    }
}
