//! Per-repository mutation signal.
//!
//! # Responsibility
//! - Count structural mutations of one repository (generation counter).
//! - Let iterators detect, without callbacks, that a mutation happened after
//!   they subscribed.
//!
//! # Invariants
//! - `notify` is called only after the store change it reports succeeded.
//! - `live_subscribers` equals the number of undropped `Subscription`s, so
//!   unsubscription on exhaustion or close is observable.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Generation counter bumped on every structural mutation.
#[derive(Debug, Default)]
pub struct MutationSignal {
    generation: AtomicU64,
    live: AtomicUsize,
}

impl MutationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts one mutation to every live subscription.
    pub fn notify(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Starts observing mutations from the current generation on.
    pub fn subscribe(&self) -> Subscription<'_> {
        self.live.fetch_add(1, Ordering::AcqRel);
        Subscription {
            signal: self,
            seen: self.generation(),
        }
    }

    pub fn live_subscribers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// One observer of a [`MutationSignal`]; unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription<'s> {
    signal: &'s MutationSignal,
    seen: u64,
}

impl Subscription<'_> {
    /// Whether any mutation happened since this subscription started.
    pub fn is_invalidated(&self) -> bool {
        self.signal.generation() != self.seen
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.signal.live.fetch_sub(1, Ordering::AcqRel);
    }
}
