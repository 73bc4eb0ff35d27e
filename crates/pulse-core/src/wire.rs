//! Pulse wire format: the heartbeat packet agents push to the registry.
//!
//! Every packet is one JSON document:
//!
//! ```text
//! { "payload": {
//!     "groupingKey": "payments",
//!     "serviceName": "payments-api",
//!     "time": 1700000000000,
//!     "metrics": { "hostname": "host-1", "updateIntervalSeconds": 10, ... },
//!     ...
//! } }
//! ```
//!
//! Fields the registry does not interpret are kept verbatim in `extra`
//! maps, so an update stores exactly what the agent sent. `online` is owned
//! by the registry; a client-supplied value is dropped during decode.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Uninterpreted JSON fields carried alongside the typed ones.
pub type Extra = Map<String, Value>;

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Outer envelope of every heartbeat. Unknown envelope fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPacket {
    pub payload: Heartbeat,
}

/// What a service instance reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    /// Logical service/cluster the instance belongs to. Not unique alone.
    pub grouping_key: String,
    /// Human-readable label, carried for diagnostics.
    pub service_name: String,
    /// When the agent produced this heartbeat.
    pub time: Timestamp,
    pub metrics: Metrics,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Health metrics. `hostname` and `updateIntervalSeconds` are required;
/// everything else is opaque to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Identifies the instance within its grouping key.
    pub hostname: String,
    /// Heartbeat cadence the instance commits to.
    pub update_interval_seconds: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── Timestamp ────────────────────────────────────────────────────────────────

/// Heartbeat time as the agent sent it.
///
/// Agents send either epoch milliseconds or an ISO 8601 string. Strings
/// without an offset are read as UTC. The value is stored in the form it
/// arrived and only converted when liveness needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Milliseconds since the Unix epoch.
    EpochMillis(f64),
    /// ISO 8601 text, e.g. `2024-03-01T12:00:00.250Z` or `2024-03-01T12:00:00`.
    Text(String),
}

impl Timestamp {
    pub fn from_epoch_secs(secs: f64) -> Self {
        Timestamp::EpochMillis(secs * 1000.0)
    }

    /// Seconds since the Unix epoch, or `None` if the value can't be read
    /// as a point in time.
    pub fn as_epoch_secs(&self) -> Option<f64> {
        match self {
            Timestamp::EpochMillis(ms) if ms.is_finite() => Some(ms / 1000.0),
            Timestamp::EpochMillis(_) => None,
            Timestamp::Text(text) => parse_text_millis(text.trim()).map(|ms| ms as f64 / 1000.0),
        }
    }
}

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_text_millis(text: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty packet")]
    Empty,
    #[error("malformed heartbeat packet: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("updateIntervalSeconds must be a non-negative number, got {0}")]
    InvalidInterval(f64),
    #[error("time {0} is not a readable point in time")]
    InvalidTime(String),
}

// ── Encoding / decoding ──────────────────────────────────────────────────────

impl HeartbeatPacket {
    pub fn new(payload: Heartbeat) -> Self {
        Self { payload }
    }

    /// Decode one packet. Whitespace around the document is allowed.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }
        let mut packet: HeartbeatPacket = serde_json::from_slice(bytes)?;
        packet.payload.extra.remove("online");
        packet.payload.validate()?;
        Ok(packet)
    }

    /// Encode as a single newline-terminated line, ready to write to a stream.
    pub fn encode_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

impl Heartbeat {
    pub fn new(
        grouping_key: impl Into<String>,
        service_name: impl Into<String>,
        hostname: impl Into<String>,
        update_interval_seconds: f64,
        time: Timestamp,
    ) -> Self {
        Self {
            grouping_key: grouping_key.into(),
            service_name: service_name.into(),
            time,
            metrics: Metrics {
                hostname: hostname.into(),
                update_interval_seconds,
                extra: Extra::new(),
            },
            extra: Extra::new(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.metrics.hostname
    }

    fn validate(&self) -> Result<(), DecodeError> {
        if self.grouping_key.is_empty() {
            return Err(DecodeError::EmptyField("groupingKey"));
        }
        if self.metrics.hostname.is_empty() {
            return Err(DecodeError::EmptyField("metrics.hostname"));
        }
        let interval = self.metrics.update_interval_seconds;
        if !interval.is_finite() || interval < 0.0 {
            return Err(DecodeError::InvalidInterval(interval));
        }
        if self.time.as_epoch_secs().is_none() {
            return Err(DecodeError::InvalidTime(format!("{:?}", self.time)));
        }
        Ok(())
    }
}
