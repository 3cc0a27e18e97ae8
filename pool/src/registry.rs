use crate::endpoint::{
    Endpoint,
    EndpointBatch,
};
use rand::Rng as _;
use serde::Serialize;
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
};

/// All endpoints that were added for one host.
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub name: String,
    pub endpoints: Vec<Arc<Endpoint>>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    hosts: Vec<Host>,
    cursor: usize,
}

impl RegistryInner {
    fn insert(&mut self, batch: EndpointBatch) {
        if batch.endpoints.is_empty() {
            return;
        }
        let endpoints = batch.endpoints.into_iter().map(Arc::new);
        match self.hosts.iter_mut().find(|host| host.name == batch.host) {
            Some(host) => host.endpoints.extend(endpoints),
            None => self.hosts.push(Host {
                name: batch.host,
                endpoints: endpoints.collect(),
            }),
        }
    }
}

/// Shared, mutable set of endpoints grouped by host.
///
/// Selection is round robin over hosts and uniformly random within a host so that load is spread
/// across servers rather than across URLs.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append endpoints under their host, creating the host if absent. Empty batches are ignored.
    pub fn add_endpoints(&self, batch: EndpointBatch) {
        debug!(host = %batch.host, endpoints = batch.endpoints.len(), "adding endpoints");
        self.lock().insert(batch);
    }

    /// Clear every host and insert `batches`, restarting the round robin.
    pub fn replace_all(&self, batches: Vec<EndpointBatch>) {
        let mut replacement = RegistryInner::default();
        for batch in batches {
            replacement.insert(batch);
        }

        let mut inner = self.lock();
        debug!(
            previous = inner.hosts.len(),
            hosts = replacement.hosts.len(),
            "replacing endpoints"
        );
        *inner = replacement;
    }

    /// Next endpoint to connect to, or `None` if the registry is empty.
    pub fn select_next(&self) -> Option<Arc<Endpoint>> {
        let mut inner = self.lock();
        if inner.hosts.is_empty() {
            return None;
        }
        let index = inner.cursor % inner.hosts.len();
        inner.cursor = (index + 1) % inner.hosts.len();

        let endpoints = &inner.hosts[index].endpoints;
        let pick = rand::rng().random_range(0..endpoints.len());
        Some(endpoints[pick].clone())
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.lock().hosts.clone()
    }

    pub fn host_count(&self) -> usize {
        self.lock().hosts.len()
    }

    pub fn endpoint_count(&self) -> usize {
        self.lock().hosts.iter().map(|host| host.endpoints.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().hosts.is_empty()
    }
}
