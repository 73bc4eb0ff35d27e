//! pulse-services: the registry core.
//!
//! Record store, liveness evaluation, heartbeat ingestion and connection
//! lifecycle. Nothing in here touches the network; transports feed bytes in
//! through [`ConnectionManager`].

pub mod clock;
pub mod ingest;
pub mod lifecycle;
pub mod liveness;
pub mod record;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ingest::{IngestError, IngestOutcome, Ingestor};
pub use lifecycle::{ConnectionId, ConnectionInfo, ConnectionManager};
pub use liveness::{Liveness, LivenessEvaluator, SweepReport};
pub use record::{RecordId, RecordKey, ServiceRecord};
pub use store::{FleetStatus, RecordStore, StoreCounts, StoreError, StoreGuard};
