//! Metrics stage: tracks the last status of every scanned URL.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use oniontree_scanner::{Event, Stage, StageError};
use serde::Serialize;
use tracing::trace;

/// Label set of a gauge series.
type Labels = (String, String, String);

/// One gauge series and its current value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeSample {
    pub service_id: String,
    pub url: String,
    pub directory: String,
    pub value: f64,
}

/// Pipeline stage holding a gauge per `(service_id, url, directory)`.
#[derive(Debug, Default)]
pub struct Metrics {
    gauges: RwLock<BTreeMap<Labels, f64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a single series.
    pub fn get(&self, service_id: &str, url: &str, directory: &str) -> Option<f64> {
        let key = (service_id.to_string(), url.to_string(), directory.to_string());
        self.gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
    }

    /// Every series, ordered by labels.
    pub fn snapshot(&self) -> Vec<GaugeSample> {
        self.gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|((service_id, url, directory), value)| GaugeSample {
                service_id: service_id.clone(),
                url: url.clone(),
                directory: directory.clone(),
                value: *value,
            })
            .collect()
    }
}

impl Stage for Metrics {
    fn name(&self) -> &'static str {
        "evtmetrics"
    }

    fn apply(&self, event: &Event) -> Result<(), StageError> {
        // Lifecycle events leave series in place.
        let Event::Scan(scan) = event else {
            return Ok(());
        };

        let value = scan.status.as_f64();
        trace!(service_id = %scan.service_id, url = %scan.url, value, "gauge set");
        self.gauges
            .write()
            .map_err(|_| StageError::Poisoned(self.name()))?
            .insert(
                (scan.service_id.clone(), scan.url.clone(), scan.directory.clone()),
                value,
            );
        Ok(())
    }
}
