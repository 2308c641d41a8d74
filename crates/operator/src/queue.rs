//! Keyed work queue with per-key exclusivity and exponential backoff.
//!
//! Guarantees:
//! - a key waits in the queue at most once, however often it is added;
//! - a key handed to a worker is not handed to another until
//!   [`WorkQueue::done`]; adds in the meantime mark it dirty and it is
//!   queued again once the first worker finishes;
//! - a key requeued after failure waits `1s, 2s, 4s, ...` capped at 60s,
//!   and adds during that wait are absorbed by the pending retry;
//! - [`WorkQueue::forget`] resets the backoff after a success.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

/// Retry delays for keys whose reconcile failed or asked to retry.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Wait before a key's first retry.
    pub initial_delay: Duration,
    /// Longest a failing key is ever held back.
    pub max_delay: Duration,
    /// Growth per consecutive failure of the same key.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Delay for a key's next retry given the delay it last waited.
pub fn next_delay(previous: Duration, config: &BackoffConfig) -> Duration {
    Duration::try_from_secs_f64(previous.as_secs_f64() * config.multiplier)
        .map_or(config.max_delay, |grown| grown.min(config.max_delay))
}

struct State<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
    delayed: HashSet<K>,
    /// Last backoff delay handed out per failing key.
    backoff: HashMap<K, Duration>,
    shutting_down: bool,
}

impl<K: Clone + Eq + Hash> State<K> {
    /// Put `key` at the back of the queue unless it is already waiting.
    /// Returns whether the queue grew.
    fn enqueue(&mut self, key: K) -> bool {
        if self.queued.contains(&key) || self.delayed.contains(&key) {
            return false;
        }
        self.queued.insert(key.clone());
        self.queue.push_back(key);
        true
    }
}

pub struct WorkQueue<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    backoff: BackoffConfig,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(backoff: BackoffConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                processing: HashSet::new(),
                dirty: HashSet::new(),
                delayed: HashSet::new(),
                backoff: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.enqueue(key) {
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Add `key` once `delay` has elapsed.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        {
            let mut state = self.lock();
            if state.shutting_down || !state.delayed.insert(key.clone()) {
                return;
            }
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.lock().delayed.remove(&key);
            queue.add(key);
        });
    }

    /// Schedule a retry of `key` with the next backoff delay.
    ///
    /// Returns the delay chosen.
    pub fn requeue_with_backoff(self: &Arc<Self>, key: K) -> Duration {
        let delay = {
            let mut state = self.lock();
            let delay = match state.backoff.get(&key) {
                Some(previous) => next_delay(*previous, &self.backoff),
                None => self.backoff.initial_delay,
            };
            state.backoff.insert(key.clone(), delay);
            delay
        };
        self.add_after(key, delay);
        delay
    }

    /// Reset the backoff of `key`.
    pub fn forget(&self, key: &K) {
        self.lock().backoff.remove(key);
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as finished; a dirty key is queued again.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shutting_down && state.enqueue(key.clone()) {
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker.
    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self, key: &K) -> bool {
        self.lock().processing.contains(key)
    }
}
