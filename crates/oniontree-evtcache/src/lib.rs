//! oniontree-evtcache: current address status per service.
//!
//! [`Cache`] is a pipeline [`Stage`]. It folds scanner events into two
//! maps kept in step with each other:
//!
//! - service ID → URL → [`Status`], URLs in first-seen order
//! - URL → service ID, for reverse lookups
//!
//! Scan events create and update entries, `WorkerStopped` drops a URL,
//! `ProcessStopped` drops the whole service. A closing scan that arrives
//! after its URL was already dropped is not recorded, so teardown leaves
//! nothing behind. Queries can be made from any task while the stage is
//! running.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use indexmap::IndexMap;
use oniontree_scanner::{
    Event, ProbeError, ProcessStopped, ScanEvent, Stage, StageError, Status, WorkerStopped,
};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct State {
    services: HashMap<String, IndexMap<String, Status>>,
    url_to_service: HashMap<String, String>,
}

impl State {
    fn record_scan(&mut self, event: &ScanEvent) {
        let ScanEvent {
            service_id,
            url,
            status,
            ..
        } = event;

        if let Some(owner) = self.url_to_service.get(url).filter(|owner| *owner != service_id) {
            warn!(%url, from = %owner, to = %service_id, "url moved to another service");
            if let Some(addresses) = self.services.get_mut(owner) {
                addresses.shift_remove(url);
            }
        }

        self.services
            .entry(service_id.clone())
            .or_default()
            .insert(url.clone(), *status);
        self.url_to_service.insert(url.clone(), service_id.clone());
    }

    /// Whether `url` is still registered to `service_id`.
    fn owns(&self, service_id: &str, url: &str) -> bool {
        self.url_to_service.get(url).is_some_and(|owner| owner == service_id)
    }

    fn remove_url(&mut self, event: &WorkerStopped) {
        if let Some(addresses) = self.services.get_mut(&event.service_id) {
            addresses.shift_remove(&event.url);
        }
        if self.url_to_service.get(&event.url) == Some(&event.service_id) {
            self.url_to_service.remove(&event.url);
        }
    }

    fn remove_service(&mut self, event: &ProcessStopped) {
        let service_id = &event.service_id;
        if let Some(addresses) = self.services.remove(service_id) {
            debug!(%service_id, urls = addresses.len(), "service dropped from cache");
        }
        self.url_to_service.retain(|_, owner| owner != service_id);
    }
}

/// Pipeline stage answering "which URLs of this service are up".
#[derive(Debug, Default)]
pub struct Cache {
    state: RwLock<State>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every known URL of a service with its latest status.
    ///
    /// `None` if the service never showed up or has stopped. A running
    /// service may have an empty map once all its workers stopped.
    pub fn get_addresses(&self, service_id: &str) -> Option<IndexMap<String, Status>> {
        self.read().services.get(service_id).cloned()
    }

    /// URLs of a service that are currently online, in first-seen order.
    pub fn get_online_addresses(&self, service_id: &str) -> Option<Vec<String>> {
        self.read().services.get(service_id).map(|addresses| {
            addresses
                .iter()
                .filter(|(_, status)| **status == Status::Online)
                .map(|(url, _)| url.clone())
                .collect()
        })
    }

    /// The service a URL belongs to, while its worker is running.
    pub fn get_service_id(&self, url: &str) -> Option<String> {
        self.read().url_to_service.get(url).cloned()
    }

    /// IDs of every service currently cached, sorted.
    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().services.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Stage for Cache {
    fn name(&self) -> &'static str {
        "evtcache"
    }

    fn apply(&self, event: &Event) -> Result<(), StageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StageError::Poisoned(self.name()))?;
        match event {
            Event::Scan(e)
                if e.error == Some(ProbeError::Cancelled) && !state.owns(&e.service_id, &e.url) =>
            {
                debug!(service_id = %e.service_id, url = %e.url, "closing scan for dropped url");
            }
            Event::Scan(e) => state.record_scan(e),
            Event::WorkerStopped(e) => state.remove_url(e),
            Event::ProcessStopped(e) => state.remove_service(e),
            Event::ProcessStarted(_) | Event::WorkerStarted(_) => {}
        }
        Ok(())
    }
}
