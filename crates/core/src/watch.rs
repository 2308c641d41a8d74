//! Typed watch events and the failure detector's trigger policy.

use crate::diagnosis::PodDiagnosis;
use crate::failure::is_failed;
use crate::pod::Pod;
use crate::types::{ObjectKey, Resource};

/// A change observed on a watched resource.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    /// The object appeared (first seen by this watcher).
    Added(K),
    /// The object changed; carries the previous and current state.
    Modified { old: K, new: K },
    /// The object disappeared; carries the last known state.
    Deleted(K),
}

impl<K: Resource> WatchEvent<K> {
    pub fn key(&self) -> ObjectKey {
        self.object().key()
    }

    /// The most recent known state of the object.
    pub fn object(&self) -> &K {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Deleted(obj) => obj,
            WatchEvent::Modified { new, .. } => new,
        }
    }
}

/// Whether a pod event should trigger a diagnosis request.
///
/// Fires on creation of an already failed pod and on the rising edge
/// from not-failed to failed. Deletions and repeated failed states never
/// fire.
pub fn should_trigger(event: &WatchEvent<Pod>) -> bool {
    match event {
        WatchEvent::Added(pod) => is_failed(pod),
        WatchEvent::Modified { old, new } => !is_failed(old) && is_failed(new),
        WatchEvent::Deleted(_) => false,
    }
}

/// Whether a diagnosis event needs a lifecycle pass.
///
/// Terminal requests are filtered here as well as in the controller's
/// entry guard.
pub fn should_reconcile_diagnosis(event: &WatchEvent<PodDiagnosis>) -> bool {
    match event {
        WatchEvent::Added(d) | WatchEvent::Modified { new: d, .. } => !d.is_terminal(),
        WatchEvent::Deleted(_) => false,
    }
}
