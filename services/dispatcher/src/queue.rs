//! Queue registry.
//!
//! One queue per canonical upstream host.  `delay_ms` is the minimum
//! spacing between dispatches from that queue to a single client; aliases
//! are alternate hostnames resolving to the same queue.  Queues are
//! registered eagerly from [`SEED_QUEUES`] at startup and lazily on first
//! use of an unknown host.  Created queues are never destroyed.

use std::collections::HashMap;
use std::sync::Arc;

/// Delay for queues auto-registered on first use of an unknown host.
pub const DEFAULT_DELAY_MS: u64 = 60_000;

/// Hosts registered at startup: `(canonical name, delay_ms, aliases)`.
pub const SEED_QUEUES: &[(&str, u64, &[&str])] = &[
    ("www.google.com", 30_000, &["google.com"]),
    ("html.duckduckgo.com", 20_000, &["duckduckgo.com"]),
    ("www.leboncoin.fr", 60_000, &["leboncoin.fr"]),
];

/// A rate-limited logical channel for one canonical host.
/// Immutable after creation.
#[derive(Debug)]
pub struct Queue {
    pub name: String,
    pub delay_ms: u64,
}

#[derive(Debug, Default)]
pub struct QueueRegistry {
    by_host: HashMap<String, Arc<Queue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue under its canonical name and each alias.
    ///
    /// Idempotent: the first registration wins — a later call with the same
    /// name may add aliases but never changes the delay.
    pub fn register(&mut self, name: &str, delay_ms: u64, aliases: &[&str]) -> Arc<Queue> {
        let queue = match self.by_host.get(name) {
            Some(existing) => existing.clone(),
            None => {
                let queue = Arc::new(Queue {
                    name: name.to_owned(),
                    delay_ms,
                });
                self.by_host.insert(name.to_owned(), queue.clone());
                queue
            }
        };
        for alias in aliases {
            self.by_host
                .entry((*alias).to_owned())
                .or_insert_with(|| queue.clone());
        }
        queue
    }

    pub fn resolve(&self, host: &str) -> Option<Arc<Queue>> {
        self.by_host.get(host).cloned()
    }

    /// Resolve a host, auto-registering it with the default delay when
    /// unknown.  The flag reports whether a new queue was created (the
    /// caller then ensures its cache directory exists).
    pub fn resolve_or_register(&mut self, host: &str) -> (Arc<Queue>, bool) {
        if let Some(queue) = self.by_host.get(host) {
            return (queue.clone(), false);
        }
        (self.register(host, DEFAULT_DELAY_MS, &[]), true)
    }

}

/// Register the static seed set.
pub fn register_seeds(registry: &mut QueueRegistry) {
    for (name, delay_ms, aliases) in SEED_QUEUES {
        registry.register(name, *delay_ms, aliases);
    }
}
