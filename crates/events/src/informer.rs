//! Polling informer.
//!
//! Lists a resource kind every poll interval, diffs the result against
//! the previous list by resource version and publishes the differences
//! as [`WatchEvent`]s. The first sync reports every existing object as
//! `Added`, which is how the controllers pick up work left over from a
//! previous run. An optional resync period republishes every cached
//! object as an unchanged `Modified` so that events dropped by a lagging
//! subscriber are eventually redelivered.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use autopsy_core::types::Resource;
use autopsy_core::{ObjectKey, Pod, PodDiagnosis, WatchEvent};
use autopsy_store::{ResourceStore, StoreError};
use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;

// ---------------------------------------------------------------------------
// Watched kinds
// ---------------------------------------------------------------------------

/// A resource kind the informer knows how to list.
pub trait Watched: Resource + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn list<'a>(
        store: &'a dyn ResourceStore,
        namespace: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<Self>, StoreError>>;
}

impl Watched for Pod {
    const KIND: &'static str = "Pod";

    fn list<'a>(
        store: &'a dyn ResourceStore,
        namespace: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<Self>, StoreError>> {
        Box::pin(async move { store.list_pods(namespace).await })
    }
}

impl Watched for PodDiagnosis {
    const KIND: &'static str = "PodDiagnosis";

    fn list<'a>(
        store: &'a dyn ResourceStore,
        namespace: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<Self>, StoreError>> {
        Box::pin(async move { store.list_diagnoses(namespace).await })
    }
}

// ---------------------------------------------------------------------------
// Informer
// ---------------------------------------------------------------------------

pub struct Informer<K: Watched> {
    store: Arc<dyn ResourceStore>,
    namespace: Option<String>,
    poll_interval: Duration,
    bus: Arc<EventBus<WatchEvent<K>>>,
    cache: HashMap<ObjectKey, K>,
    resync_period: Option<Duration>,
    last_resync: Instant,
}

impl<K: Watched> Informer<K> {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        namespace: Option<String>,
        poll_interval: Duration,
        bus: Arc<EventBus<WatchEvent<K>>>,
    ) -> Self {
        Self {
            store,
            namespace,
            poll_interval,
            bus,
            cache: HashMap::new(),
            resync_period: None,
            last_resync: Instant::now(),
        }
    }

    pub fn with_resync(mut self, period: Duration) -> Self {
        self.resync_period = Some(period);
        self
    }

    /// Run the poll loop until the cancellation token is triggered.
    ///
    /// A failed list leaves the cache untouched; the next tick retries.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            kind = K::KIND,
            namespace = self.namespace.as_deref().unwrap_or("*"),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Informer started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(kind = K::KIND, "Informer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync().await {
                        tracing::warn!(kind = K::KIND, error = %e, "List failed");
                    }
                    if self
                        .resync_period
                        .is_some_and(|period| self.last_resync.elapsed() >= period)
                    {
                        let count = self.resync();
                        tracing::debug!(kind = K::KIND, count, "Resynced cache");
                    }
                }
            }
        }
    }

    /// One list-and-diff cycle. Returns the number of events published.
    pub async fn sync(&mut self) -> Result<usize, StoreError> {
        let listed = K::list(self.store.as_ref(), self.namespace.as_deref()).await?;
        let events = diff(&mut self.cache, listed);
        let count = events.len();

        for event in events {
            tracing::trace!(kind = K::KIND, object = %event.key(), "Publishing watch event");
            self.bus.publish(event);
        }
        Ok(count)
    }

    /// Republish every cached object as an unchanged modification.
    pub fn resync(&mut self) -> usize {
        self.last_resync = Instant::now();
        let mut keys: Vec<&ObjectKey> = self.cache.keys().collect();
        keys.sort();
        for key in &keys {
            let obj = &self.cache[*key];
            self.bus.publish(WatchEvent::Modified {
                old: obj.clone(),
                new: obj.clone(),
            });
        }
        keys.len()
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Replace `cache` with `listed`, returning the changes between them.
///
/// Objects are compared by resource version; deletions carry the last
/// cached state and are reported after additions and modifications.
pub fn diff<K: Resource + Clone>(
    cache: &mut HashMap<ObjectKey, K>,
    listed: Vec<K>,
) -> Vec<WatchEvent<K>> {
    let mut events = Vec::new();
    let mut previous = std::mem::take(cache);

    for obj in listed {
        let key = obj.key();
        match previous.remove(&key) {
            None => events.push(WatchEvent::Added(obj.clone())),
            Some(old) if old.resource_version() != obj.resource_version() => {
                events.push(WatchEvent::Modified {
                    old,
                    new: obj.clone(),
                });
            }
            Some(_) => {}
        }
        cache.insert(key, obj);
    }

    let gone: BTreeMap<ObjectKey, K> = previous.into_iter().collect();
    events.extend(gone.into_values().map(WatchEvent::Deleted));
    events
}
