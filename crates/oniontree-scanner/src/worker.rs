//! Probe worker: watches a single URL until shutdown.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::config::ScannerConfig;
use crate::event::{Event, ScanEvent, Status, WorkerStarted, WorkerStopped};
use crate::shutdown::{cancelled, is_shutdown};
use crate::transport::{Endpoint, ProbeError, Transport};

/// Channels a worker shares with its supervisor.
pub(crate) struct WorkerLinks {
    /// Shared outbound event stream.
    pub events: mpsc::Sender<Event>,
    pub shutdown: watch::Receiver<bool>,
    /// Receives the worker's URL once `WorkerStopped` has been emitted.
    pub stopped: mpsc::UnboundedSender<String>,
    /// Flips to `true` once the supervisor has emitted `ProcessStopped`.
    pub release: watch::Receiver<bool>,
}

pub(crate) struct Worker {
    pub endpoint: Endpoint,
    pub service_id: String,
    pub directory: String,
    pub config: Arc<ScannerConfig>,
    pub transport: Arc<dyn Transport>,
}

impl Worker {
    /// Run the probe loop.
    ///
    /// Emits `WorkerStarted`, then a `ScanEvent` on the first result and on
    /// every status change. On shutdown emits `WorkerStopped`, waits for
    /// the supervisor's release, and emits a final `Offline` scan event
    /// carrying [`ProbeError::Cancelled`]. Returns early if the event
    /// stream has no reader left.
    pub async fn run(self, links: WorkerLinks) {
        let WorkerLinks {
            events,
            mut shutdown,
            stopped,
            mut release,
        } = links;
        let url = self.endpoint.url().to_string();

        if events.send(WorkerStarted { url: url.clone() }.into()).await.is_err() {
            return;
        }
        debug!(service_id = %self.service_id, %url, "worker started");

        let mut last_status = None;
        loop {
            if events.is_closed() {
                return;
            }
            if is_shutdown(&shutdown) {
                break;
            }

            let (status, error) = self.probe().await;
            trace!(%url, ?status, "probe finished");
            if last_status != Some(status) {
                if let Some(error) = &error {
                    debug!(%url, %error, "url offline");
                } else {
                    debug!(%url, "url online");
                }
                if events.send(self.scan_event(status, error).into()).await.is_err() {
                    return;
                }
                last_status = Some(status);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.scan_interval) => {}
                _ = cancelled(&mut shutdown) => break,
            }
        }

        let worker_stopped = WorkerStopped {
            url: url.clone(),
            service_id: self.service_id.clone(),
            error: None,
        };
        if events.send(worker_stopped.into()).await.is_err() {
            return;
        }
        debug!(service_id = %self.service_id, %url, "worker stopped");

        let _ = stopped.send(url);
        let _ = release.wait_for(|released| *released).await;

        let last = self.scan_event(Status::Offline, Some(ProbeError::Cancelled));
        let _ = events.send(last.into()).await;
    }

    async fn probe(&self) -> (Status, Option<ProbeError>) {
        let timeout = self.config.probe_timeout;
        match tokio::time::timeout(timeout, self.transport.check(&self.endpoint)).await {
            Ok(Ok(())) => (Status::Online, None),
            Ok(Err(e)) => (Status::Offline, Some(e)),
            Err(_) => (Status::Offline, Some(ProbeError::Timeout(timeout))),
        }
    }

    fn scan_event(&self, status: Status, error: Option<ProbeError>) -> ScanEvent {
        ScanEvent {
            status,
            url: self.endpoint.url().to_string(),
            service_id: self.service_id.clone(),
            directory: self.directory.clone(),
            error,
        }
    }
}
