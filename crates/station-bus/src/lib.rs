//! # station-bus
//!
//! In-process publish/subscribe with wildcard patterns, used identically on
//! the client and the server.
//!
//! Subscriptions are keyed by pattern: an exact event name, `entity:*`,
//! `*:action`, or `*:*`. Publishing an event enumerates its candidate
//! patterns in order and fires **every** handler under every matching
//! pattern: this is fan-out, not routing, and there is no short-circuit.
//! Within one pattern's list, insertion order is the only call-order
//! guarantee.
//!
//! Handlers run synchronously in the publisher's turn. A handler that
//! returns an error or panics is logged and skipped so one broken
//! subscriber never starves the rest.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error};

use station_core::ids::ClientId;
use station_core::pattern::candidates;

/// A subscriber callback.
///
/// Receives `(data, origin, event)`: the payload, the connection that
/// caused the publish (if any), and the concrete event name (useful for
/// wildcard subscribers).
pub type Handler =
    Arc<dyn Fn(&Value, Option<&ClientId>, &str) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
///
/// Closures have no structural equality in Rust, so removal is by handle
/// rather than by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    handler: Handler,
}

/// Pattern-keyed handler table.
///
/// One instance per process side, owned by the hub object and passed by
/// reference, never a process-wide singleton, so tests cannot leak state
/// into each other.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `pattern`, appending to any existing list.
    ///
    /// No dedup, no priority: the same closure may be registered twice and
    /// will then fire twice.
    pub fn subscribe(&self, pattern: impl Into<String>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut table = self.handlers.write();
        table
            .entry(pattern.into())
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Remove one registration from `pattern`'s list.
    ///
    /// Returns `false` when nothing under that pattern carries the id.
    pub fn unsubscribe(&self, pattern: &str, id: SubscriptionId) -> bool {
        let mut table = self.handlers.write();
        let Some(list) = table.get_mut(pattern) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.id == id) else {
            return false;
        };
        let _ = list.remove(pos);
        if list.is_empty() {
            let _ = table.remove(pattern);
        }
        true
    }

    /// Dispatch `event` to every handler under every matching pattern.
    ///
    /// Candidate patterns are evaluated in the fixed order
    /// `[exact, entity:*, *:action, *:*]`; missing lists are empty, not an
    /// error. Handlers run synchronously here, in pattern-then-insertion
    /// order. Faults are caught and logged.
    pub fn publish(&self, event: &str, data: &Value, origin: Option<&ClientId>) {
        // Snapshot matching handlers so subscribers may (un)subscribe
        // from inside a callback without deadlocking.
        let matched: Vec<Handler> = {
            let table = self.handlers.read();
            candidates(event)
                .iter()
                .filter_map(|p| table.get(p.as_str()))
                .flatten()
                .map(|r| Arc::clone(&r.handler))
                .collect()
        };

        debug!(event, handlers = matched.len(), "bus dispatch");
        for handler in matched {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| handler(data, origin, event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(event, error = %e, "bus handler failed"),
                Err(_) => error!(event, "bus handler panicked"),
            }
        }
    }

    /// Number of handlers currently registered under `pattern`.
    #[must_use]
    pub fn handler_count(&self, pattern: &str) -> usize {
        self.handlers.read().get(pattern).map_or(0, Vec::len)
    }
}
