// Last-observed lifecycle status per container; emits transitions only

use crate::models::{LifecycleStatus, ResourceId, ResourceSummary, StatusTransition};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;

#[derive(Default)]
pub struct StatusTracker {
    statuses: DashMap<ResourceId, LifecycleStatus>,
}

/// Result of reconciling the tracker against a full listing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub transitions: Vec<StatusTransition>,
    pub forgotten: Vec<ResourceId>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// First sight of an id records it silently; later sights return a transition iff the
    /// status changed.
    pub fn observe(&self, id: &str, status: LifecycleStatus) -> Option<StatusTransition> {
        match self.statuses.entry(id.to_string()) {
            Entry::Vacant(v) => {
                v.insert(status);
                None
            }
            Entry::Occupied(mut o) => {
                if *o.get() == status {
                    return None;
                }
                let previous = o.insert(status);
                Some(StatusTransition {
                    id: id.to_string(),
                    previous,
                    current: status,
                })
            }
        }
    }

    pub fn forget(&self, id: &str) -> bool {
        self.statuses.remove(id).is_some()
    }

    pub fn current(&self, id: &str) -> Option<LifecycleStatus> {
        self.statuses.get(id).map(|s| *s)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Observes every listed container and forgets tracked ids missing from the listing.
    pub fn reconcile(&self, listing: &[ResourceSummary]) -> Reconciliation {
        let transitions = listing
            .iter()
            .filter_map(|r| self.observe(&r.id, r.status))
            .collect();

        let present: HashSet<&str> = listing.iter().map(|r| r.id.as_str()).collect();
        let vanished: Vec<ResourceId> = self
            .statuses
            .iter()
            .filter(|e| !present.contains(e.key().as_str()))
            .map(|e| e.key().clone())
            .collect();
        let forgotten = vanished.into_iter().filter(|id| self.forget(id)).collect();

        Reconciliation {
            transitions,
            forgotten,
        }
    }
}
