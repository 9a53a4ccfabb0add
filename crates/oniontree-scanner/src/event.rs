//! Events emitted by the scanner and consumed by pipeline stages.
//!
//! All variants are plain values. A stage matches on [`Event`]
//! exhaustively, so adding a variant forces every consumer to decide how
//! to handle it.

use serde::{Deserialize, Serialize};

use crate::transport::ProbeError;

/// Liveness of a single URL.
///
/// The discriminant doubles as the gauge value exported for the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Status {
    Offline = 0,
    Online = 1,
}

impl Status {
    /// Numeric value of the status, as exported to metrics.
    pub fn as_f64(self) -> f64 {
        f64::from(self as u8)
    }
}

/// The supervisor for a service has begun.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStarted {
    pub service_id: String,
}

/// The supervisor for a service has wound down; all its workers stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStopped {
    pub service_id: String,
}

/// A probe worker for a URL has begun.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStarted {
    pub url: String,
}

/// A probe worker has left its loop.
///
/// `error` is `None` when the worker stopped on the shutdown signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStopped {
    pub url: String,
    pub service_id: String,
    pub error: Option<ProbeError>,
}

/// A probe completed with a new status, or a terminal status was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub status: Status,
    pub url: String,
    pub service_id: String,
    /// Repository the service was read from.
    pub directory: String,
    /// Set only when `status` is `Offline` because of an error.
    pub error: Option<ProbeError>,
}

/// Everything that flows through a scanner channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ProcessStarted(ProcessStarted),
    ProcessStopped(ProcessStopped),
    WorkerStarted(WorkerStarted),
    WorkerStopped(WorkerStopped),
    Scan(ScanEvent),
}

impl Event {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ProcessStarted(_) => "process_started",
            Event::ProcessStopped(_) => "process_stopped",
            Event::WorkerStarted(_) => "worker_started",
            Event::WorkerStopped(_) => "worker_stopped",
            Event::Scan(_) => "scan",
        }
    }
}

impl From<ProcessStarted> for Event {
    fn from(e: ProcessStarted) -> Self {
        Event::ProcessStarted(e)
    }
}

impl From<ProcessStopped> for Event {
    fn from(e: ProcessStopped) -> Self {
        Event::ProcessStopped(e)
    }
}

impl From<WorkerStarted> for Event {
    fn from(e: WorkerStarted) -> Self {
        Event::WorkerStarted(e)
    }
}

impl From<WorkerStopped> for Event {
    fn from(e: WorkerStopped) -> Self {
        Event::WorkerStopped(e)
    }
}

impl From<ScanEvent> for Event {
    fn from(e: ScanEvent) -> Self {
        Event::Scan(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_gauge_values() {
        assert_eq!(Status::Offline.as_f64(), 0.0);
        assert_eq!(Status::Online.as_f64(), 1.0);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(as_toml_str(Status::Online), "online");
        assert_eq!(as_toml_str(Status::Offline), "offline");
    }

    fn as_toml_str(status: Status) -> String {
        toml::Value::try_from(status)
            .unwrap()
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn event_kind_names() {
        let event: Event = WorkerStarted {
            url: "http://a.onion".to_string(),
        }
        .into();
        assert_eq!(event.kind(), "worker_started");

        let event: Event = ProcessStopped {
            service_id: "oniontree".to_string(),
        }
        .into();
        assert_eq!(event.kind(), "process_stopped");
    }
}
