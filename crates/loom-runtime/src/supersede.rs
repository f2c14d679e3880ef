//! Latest request wins.
//!
//! Hosts that fire builds or lookups per keystroke tag each request with a
//! ticket from [`Supersede::begin`]; when the result arrives, a ticket that
//! is no longer current means a newer request exists and the result is
//! dropped.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Tracker {
    latest: DashMap<String, u64>,
    counter: AtomicU64,
}

/// Per-namespace request tracker.
#[derive(Debug, Clone, Default)]
pub struct Supersede {
    tracker: Arc<Tracker>,
}

/// One request in a namespace.
#[derive(Debug, Clone)]
pub struct Ticket {
    namespace: String,
    id: u64,
    tracker: Arc<Tracker>,
}

impl Supersede {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request, superseding every earlier one in `namespace`.
    pub fn begin(&self, namespace: &str) -> Ticket {
        let id = self.tracker.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.latest.insert(namespace.to_string(), id);
        Ticket {
            namespace: namespace.to_string(),
            id,
            tracker: self.tracker.clone(),
        }
    }

    /// Close a request. The namespace is cleared only if `ticket` is
    /// still its latest; returns whether it was.
    pub fn finish(&self, ticket: &Ticket) -> bool {
        self.tracker
            .latest
            .remove_if(&ticket.namespace, |_, id| *id == ticket.id)
            .is_some()
    }

    /// Namespaces with a request in progress.
    pub fn active(&self) -> usize {
        self.tracker.latest.len()
    }
}

impl Ticket {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// False once a newer ticket for the same namespace exists.
    pub fn is_current(&self) -> bool {
        self.tracker
            .latest
            .get(&self.namespace)
            .map(|id| *id == self.id)
            .unwrap_or(false)
    }
}
