//! oniontree-evtmetrics: status gauges for scraping.
//!
//! [`Metrics`] is a pipeline stage that keeps one gauge per
//! `(service_id, url, directory)`, set to the numeric [`Status`] of the
//! latest scan event. Series are never removed: the last known value
//! outlives the worker that produced it.
//!
//! # Architecture
//!
//! ```text
//! Metrics (Stage)
//!   ├── apply() ← ScanEvent sets the gauge
//!   └── snapshot() → Vec<GaugeSample>
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```
//!
//! [`Status`]: oniontree_scanner::Status

pub mod collector;
pub mod prometheus;

pub use collector::{GaugeSample, Metrics};
pub use prometheus::render_prometheus;
