//! Scanning orchestrator.
//!
//! Reads the service list once, starts one [`Process`] per service, and
//! funnels every event onto the caller's channel. Repository changes made
//! while a scan runs are not picked up; restart the scan for that.

use std::path::Path;
use std::sync::Arc;

use oniontree::{OnionTree, ServiceRepository};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ScannerConfig;
use crate::event::Event;
use crate::process::Process;
use crate::shutdown::cancelled;
use crate::transport::{self, Transport};

/// Errors that abort a scan before it starts.
#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("failed to read repository: {0}")]
    Repository(#[from] oniontree::Error),
}

/// Runs one scan over a repository.
///
/// Holds no global state; each instance is independent. Running two
/// scanners over the same directory at once is not coordinated.
pub struct Scanner {
    config: Arc<ScannerConfig>,
    transport: Arc<dyn Transport>,
}

impl Scanner {
    /// Create a scanner using the transport named in `config`.
    pub fn new(config: ScannerConfig) -> Self {
        let transport = transport::from_config(&config);
        Self::with_transport(config, transport)
    }

    /// Create a scanner with a custom transport.
    pub fn with_transport(config: ScannerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// Scan the OnionTree repository at `dir`.
    ///
    /// See [`Scanner::start_with`]. Fails immediately if `dir` is not a
    /// readable repository.
    pub async fn start(
        &self,
        shutdown: watch::Receiver<bool>,
        dir: impl AsRef<Path>,
        events: mpsc::Sender<Event>,
    ) -> Result<(), ScannerError> {
        let tree = OnionTree::open(dir)?;
        self.start_with(shutdown, &tree, events).await
    }

    /// Scan every service in `repo`, sending all events to `events`.
    ///
    /// Returns once shutdown was requested and every supervisor has wound
    /// down. The sender is dropped on return, so a reader of `events`
    /// sees end-of-stream after the last teardown event. Services whose
    /// record cannot be read are logged and skipped.
    pub async fn start_with<R>(
        &self,
        mut shutdown: watch::Receiver<bool>,
        repo: &R,
        events: mpsc::Sender<Event>,
    ) -> Result<(), ScannerError>
    where
        R: ServiceRepository + ?Sized,
    {
        let ids = repo.list_services()?;
        let directory = repo.dir().display().to_string();

        let mut processes = JoinSet::new();
        for service_id in ids {
            let service = match repo.get_service(&service_id) {
                Ok(service) => service,
                Err(e) => {
                    warn!(%service_id, error = %e, "skipping unreadable service");
                    continue;
                }
            };
            let process = Process {
                service_id,
                urls: service.urls,
                directory: directory.clone(),
                config: self.config.clone(),
                transport: self.transport.clone(),
            };
            processes.spawn(process.run(events.clone(), shutdown.clone()));
        }
        drop(events);

        info!(services = processes.len(), %directory, "scan started");

        while let Some(result) = processes.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "process task failed");
            }
        }
        cancelled(&mut shutdown).await;

        info!(%directory, "scan finished");
        Ok(())
    }
}
