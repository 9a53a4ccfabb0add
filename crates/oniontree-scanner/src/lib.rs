//! oniontree-scanner: liveness scanning for OnionTree services.
//!
//! Turns a repository of services into a stream of lifecycle and status
//! [`Event`]s. One supervisor task runs per service and one probe worker
//! task per URL; everything they emit is multiplexed onto a single
//! channel handed to [`Scanner::start`].
//!
//! # Architecture
//!
//! ```text
//! Scanner
//!   └── Process (one per service)
//!         ├── ProcessStarted / ProcessStopped
//!         └── Worker (one per URL)
//!               ├── WorkerStarted
//!               ├── ScanEvent on every status transition
//!               └── WorkerStopped, then a final Offline ScanEvent
//! ```
//!
//! Downstream consumers implement [`Stage`]: read events, update private
//! state, optionally forward each event unchanged to the next stage.
//! Stages chain with [`run_pipeline`].
//!
//! Shutdown is cooperative. Every task holds a clone of the same
//! `watch::Receiver<bool>`; flipping it to `true` (or dropping the sender)
//! asks everything to wind down at its next suspension point.

pub mod config;
pub mod event;
mod process;
pub mod scanner;
pub mod shutdown;
pub mod stage;
pub mod transport;
mod worker;

pub use config::{ConfigError, ScannerConfig, ScannerSection, TransportKind};
pub use event::{
    Event, ProcessStarted, ProcessStopped, ScanEvent, Status, WorkerStarted, WorkerStopped,
};
pub use scanner::{Scanner, ScannerError};
pub use stage::{Stage, StageError, StageFuture, run_pipeline};
pub use transport::{Endpoint, HttpTransport, ProbeError, TcpTransport, Transport};
