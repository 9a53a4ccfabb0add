//! Pipeline stage contract.
//!
//! A stage consumes an event stream, folds each event into its own state,
//! and optionally forwards the event unchanged to the next stage:
//!
//! ```text
//! Scanner ──► cache ──► metrics ──► (end)
//! ```
//!
//! Each stage owns its input receiver and its output sender, so every
//! link in the chain has exactly one writer and one reader. A stage stops
//! when its input closes or shutdown is requested and drops its output on
//! the way out, which the next stage sees as end-of-stream.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::event::Event;
use crate::shutdown::cancelled;

/// Unrecoverable stage faults. Shutdown and end-of-stream are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("stage `{0}` state lock poisoned")]
    Poisoned(&'static str),

    #[error("stage task failed: {0}")]
    Task(String),
}

/// Boxed future returned by [`Stage::read_events`].
pub type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>>;

/// A consumer of scanner events that can be chained with others.
pub trait Stage: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fold a single event into the stage's state.
    fn apply(&self, event: &Event) -> Result<(), StageError>;

    /// Consume `input` until it closes or shutdown is requested.
    ///
    /// Every event is applied, then forwarded to `output` if one is
    /// given, in arrival order. `output` is dropped on return. Returns
    /// `Ok(())` on end-of-stream and on shutdown; an error from
    /// [`Stage::apply`] ends the stage.
    fn read_events<'a>(
        &'a self,
        shutdown: watch::Receiver<bool>,
        input: mpsc::Receiver<Event>,
        output: Option<mpsc::Sender<Event>>,
    ) -> StageFuture<'a> {
        Box::pin(drive(self, shutdown, input, output))
    }
}

async fn drive<S>(
    stage: &S,
    mut shutdown: watch::Receiver<bool>,
    mut input: mpsc::Receiver<Event>,
    mut output: Option<mpsc::Sender<Event>>,
) -> Result<(), StageError>
where
    S: Stage + ?Sized,
{
    let name = stage.name();
    debug!(stage = name, "stage reading events");

    loop {
        let event = tokio::select! {
            event = input.recv() => match event {
                Some(event) => event,
                None => {
                    debug!(stage = name, "input closed");
                    break;
                }
            },
            _ = cancelled(&mut shutdown) => {
                debug!(stage = name, "stage shutting down");
                break;
            }
        };

        stage.apply(&event)?;

        let Some(tx) = &output else { continue };
        let forwarded = tokio::select! {
            sent = tx.send(event) => sent.is_ok(),
            _ = cancelled(&mut shutdown) => {
                debug!(stage = name, "stage shutting down");
                break;
            }
        };
        if !forwarded {
            debug!(stage = name, "downstream closed, no longer forwarding");
            output = None;
        }
    }
    Ok(())
}

/// Chain `stages` in order behind `input` and run them to completion.
///
/// Links between stages are bounded channels of `buffer` events. The last
/// stage forwards nowhere. Returns the first stage error, if any, after
/// every stage has stopped.
pub async fn run_pipeline(
    shutdown: watch::Receiver<bool>,
    input: mpsc::Receiver<Event>,
    stages: Vec<Arc<dyn Stage>>,
    buffer: usize,
) -> Result<(), StageError> {
    let count = stages.len();
    let mut input = Some(input);
    let mut tasks = JoinSet::new();

    for (index, stage) in stages.into_iter().enumerate() {
        let Some(rx) = input.take() else { break };
        let output = if index + 1 < count {
            let (tx, next) = mpsc::channel(buffer.max(1));
            input = Some(next);
            Some(tx)
        } else {
            None
        };
        let shutdown = shutdown.clone();
        tasks.spawn(async move { stage.read_events(shutdown, rx, output).await });
    }

    let mut first_error = None;
    while let Some(result) = tasks.join_next().await {
        let result = result.map_err(|e| StageError::Task(e.to_string())).and_then(|r| r);
        if let Err(e) = result {
            error!(error = %e, "pipeline stage failed");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::event::{ProcessStarted, WorkerStarted};

    /// Records every event it sees.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Event>>,
    }

    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn apply(&self, event: &Event) -> Result<(), StageError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Fails on the first `WorkerStarted`.
    struct Faulty;

    impl Stage for Faulty {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn apply(&self, event: &Event) -> Result<(), StageError> {
            match event {
                Event::WorkerStarted(_) => Err(StageError::Poisoned("faulty")),
                _ => Ok(()),
            }
        }
    }

    fn started(id: &str) -> Event {
        ProcessStarted {
            service_id: id.to_string(),
        }
        .into()
    }

    #[tokio::test]
    async fn forwards_in_order_and_closes_output() {
        let stage = Recorder::default();
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        for id in ["a", "b", "c"] {
            in_tx.send(started(id)).await.unwrap();
        }
        drop(in_tx);

        stage.read_events(shutdown_rx, in_rx, Some(out_tx)).await.unwrap();

        let mut forwarded = Vec::new();
        while let Some(event) = out_rx.recv().await {
            forwarded.push(event);
        }
        let expected = vec![started("a"), started("b"), started("c")];
        assert_eq!(forwarded, expected);
        assert_eq!(*stage.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn shutdown_returns_ok_and_closes_output() {
        let stage = Recorder::default();
        let (_in_tx, in_rx) = mpsc::channel::<Event>(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let run = stage.read_events(shutdown_rx, in_rx, Some(out_tx));
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("stage should stop on shutdown")
            .unwrap();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn apply_error_ends_stage() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        in_tx.send(started("a")).await.unwrap();
        in_tx
            .send(
                WorkerStarted {
                    url: "http://a.onion".to_string(),
                }
                .into(),
            )
            .await
            .unwrap();

        let err = Faulty
            .read_events(shutdown_rx, in_rx, Some(out_tx))
            .await
            .unwrap_err();
        assert_eq!(err, StageError::Poisoned("faulty"));
        assert_eq!(out_rx.recv().await, Some(started("a")));
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_downstream_keeps_consuming() {
        let stage = Recorder::default();
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(out_rx);

        in_tx.send(started("a")).await.unwrap();
        in_tx.send(started("b")).await.unwrap();
        drop(in_tx);

        stage.read_events(shutdown_rx, in_rx, Some(out_tx)).await.unwrap();
        assert_eq!(stage.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pipeline_feeds_every_stage() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        for id in ["a", "b"] {
            tx.send(started(id)).await.unwrap();
        }
        drop(tx);

        run_pipeline(
            shutdown_rx,
            rx,
            vec![first.clone() as Arc<dyn Stage>, second.clone() as Arc<dyn Stage>],
            4,
        )
        .await
        .unwrap();

        let expected = vec![started("a"), started("b")];
        assert_eq!(*first.seen.lock().unwrap(), expected);
        assert_eq!(*second.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn pipeline_reports_stage_error() {
        let tail = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(started("a")).await.unwrap();
        tx.send(
            WorkerStarted {
                url: "http://a.onion".to_string(),
            }
            .into(),
        )
        .await
        .unwrap();
        drop(tx);

        let err = run_pipeline(
            shutdown_rx,
            rx,
            vec![Arc::new(Faulty) as Arc<dyn Stage>, tail.clone() as Arc<dyn Stage>],
            4,
        )
        .await
        .unwrap_err();
        assert_eq!(err, StageError::Poisoned("faulty"));
        assert_eq!(*tail.seen.lock().unwrap(), vec![started("a")]);
    }
}
