//! Process supervisor: one per service.
//!
//! Spawns a worker per URL and keeps count of the ones still running. It
//! never probes anything itself.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ScannerConfig;
use crate::event::{Event, ProcessStarted, ProcessStopped};
use crate::transport::{Endpoint, Transport};
use crate::worker::{Worker, WorkerLinks};

pub(crate) struct Process {
    pub service_id: String,
    pub urls: Vec<String>,
    pub directory: String,
    pub config: Arc<ScannerConfig>,
    pub transport: Arc<dyn Transport>,
}

impl Process {
    /// Supervise the service's workers until all of them have stopped.
    ///
    /// Emits `ProcessStarted` first and `ProcessStopped` once the last
    /// worker reported `WorkerStopped`. Workers hold their final scan
    /// event until `ProcessStopped` is out, and this returns only after
    /// they have all finished.
    pub async fn run(self, events: mpsc::Sender<Event>, shutdown: watch::Receiver<bool>) {
        let service_id = self.service_id;
        let started = ProcessStarted {
            service_id: service_id.clone(),
        };
        if events.send(started.into()).await.is_err() {
            return;
        }

        let (stopped_tx, mut stopped_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = watch::channel(false);
        let mut workers = JoinSet::new();

        for url in &self.urls {
            let endpoint = match Endpoint::parse(url) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!(%service_id, %url, error = %e, "skipping malformed url");
                    continue;
                }
            };
            let worker = Worker {
                endpoint,
                service_id: service_id.clone(),
                directory: self.directory.clone(),
                config: self.config.clone(),
                transport: self.transport.clone(),
            };
            workers.spawn(worker.run(WorkerLinks {
                events: events.clone(),
                shutdown: shutdown.clone(),
                stopped: stopped_tx.clone(),
                release: release_rx.clone(),
            }));
        }
        drop(stopped_tx);

        let mut running = workers.len();
        info!(%service_id, workers = running, "process started");

        // Reporting workers stay alive until released, so a task that
        // finishes in here returned early or panicked without reporting.
        while running > 0 {
            tokio::select! {
                report = stopped_rx.recv() => match report {
                    Some(url) => {
                        running -= 1;
                        debug!(%service_id, %url, running, "worker reported stop");
                    }
                    None => break,
                },
                Some(result) = workers.join_next() => {
                    running -= 1;
                    match result {
                        Ok(()) => debug!(%service_id, running, "worker exited without reporting"),
                        Err(e) => error!(%service_id, error = %e, running, "worker task failed"),
                    }
                }
            }
        }

        let stopped = ProcessStopped {
            service_id: service_id.clone(),
        };
        let _ = events.send(stopped.into()).await;
        let _ = release_tx.send(true);

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(%service_id, error = %e, "worker task failed");
            }
        }
        info!(%service_id, "process stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::event::{ScanEvent, Status, WorkerStarted, WorkerStopped};
    use crate::transport::{CheckFuture, ProbeError};

    struct AlwaysOnline;

    impl Transport for AlwaysOnline {
        fn check<'a>(&'a self, _endpoint: &'a Endpoint) -> CheckFuture<'a> {
            Box::pin(async { Ok(()) })
        }
    }

    /// Panics for hosts starting with `boom`, online otherwise.
    struct Explosive;

    impl Transport for Explosive {
        fn check<'a>(&'a self, endpoint: &'a Endpoint) -> CheckFuture<'a> {
            if endpoint.host().starts_with("boom") {
                panic!("transport failure");
            }
            Box::pin(async { Ok(()) })
        }
    }

    fn process(urls: &[&str]) -> Process {
        process_with(urls, Arc::new(AlwaysOnline))
    }

    fn process_with(urls: &[&str], transport: Arc<dyn Transport>) -> Process {
        Process {
            service_id: "oniontree".to_string(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            directory: "/srv/oniontree".to_string(),
            config: Arc::new(ScannerConfig {
                scan_interval: Duration::from_secs(3600),
                ..ScannerConfig::default()
            }),
            transport,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn no_valid_urls_stops_immediately() {
        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        process(&["not a url", "ftp://x.onion"]).run(tx, shutdown_rx).await;

        assert_eq!(
            collect(rx).await,
            vec![
                ProcessStarted {
                    service_id: "oniontree".to_string()
                }
                .into(),
                ProcessStopped {
                    service_id: "oniontree".to_string()
                }
                .into(),
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_orders_stop_events() {
        let urls = ["http://onions52ehmf4q75.onion", "http://onions53ehmf4q75.onion"];
        let (tx, mut rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(process(&urls).run(tx, shutdown_rx));

        // Started + one worker start and online scan per url.
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(rx.recv().await.unwrap());
        }
        assert!(matches!(seen[0], Event::ProcessStarted(_)));
        let online = seen
            .iter()
            .filter(|e| matches!(e, Event::Scan(ScanEvent { status: Status::Online, .. })))
            .count();
        assert_eq!(online, 2);
        let started = seen
            .iter()
            .filter(|e| matches!(e, Event::WorkerStarted(WorkerStarted { .. })))
            .count();
        assert_eq!(started, 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        let tail = collect(rx).await;
        assert_eq!(tail.len(), 5);

        // Both WorkerStopped, then ProcessStopped, then both final scans.
        assert!(tail[..2].iter().all(|e| matches!(
            e,
            Event::WorkerStopped(WorkerStopped { error: None, .. })
        )));
        assert_eq!(
            tail[2],
            ProcessStopped {
                service_id: "oniontree".to_string()
            }
            .into()
        );
        assert!(tail[3..].iter().all(|e| matches!(
            e,
            Event::Scan(ScanEvent {
                status: Status::Offline,
                error: Some(ProbeError::Cancelled),
                ..
            })
        )));
    }

    #[tokio::test]
    async fn panicked_worker_does_not_block_shutdown() {
        const GOOD: &str = "http://onions52ehmf4q75.onion";
        let urls = [GOOD, "http://boomboomboom5q75.onion"];
        let (tx, mut rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(process_with(&urls, Arc::new(Explosive)).run(tx, shutdown_rx));

        loop {
            let event = rx.recv().await.unwrap();
            if matches!(&event, Event::Scan(ScanEvent { url, .. }) if url == GOOD) {
                break;
            }
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("supervisor should stop despite the panicked worker")
            .unwrap();

        let tail = collect(rx).await;
        let stopped_at = tail
            .iter()
            .position(|e| matches!(e, Event::ProcessStopped(_)))
            .expect("ProcessStopped emitted");
        assert!(matches!(
            tail.last(),
            Some(Event::Scan(ScanEvent {
                status: Status::Offline,
                error: Some(ProbeError::Cancelled),
                ..
            }))
        ));
        assert_eq!(stopped_at, tail.len() - 2);
    }
}
