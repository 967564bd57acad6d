//! Acknowledgement decisions and the redelivery ceiling.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::time::Instant;

/// What a handler wants the broker to do with the message it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckDecision {
    /// Processed; remove from the queue.
    Accept,
    /// Not processed right now; put it back for another attempt.
    RejectRequeue,
    /// Will never be processable; route to the dead-letter exchange.
    RejectDiscard,
}

impl fmt::Display for AckDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::RejectRequeue => write!(f, "reject-requeue"),
            Self::RejectDiscard => write!(f, "reject-discard"),
        }
    }
}

/// Entries kept before the tracker forgets everything and starts over.
const TRACKER_CAPACITY: usize = 4096;

/// Counts requeues per message body so a message that keeps failing ends
/// up dead-lettered instead of looping forever.
///
/// Messages are identified by a hash of their body. Identical bodies share
/// a counter. A message is only discarded once it has been requeued
/// `max_redeliveries` times *and* its first requeue is at least `window`
/// old, so a quick run of requeues (a bystander handing a message back
/// while its owner is busy) cannot exhaust it.
#[derive(Debug)]
pub struct RedeliveryTracker {
    max_redeliveries: u32,
    window: Duration,
    counts: HashMap<u64, Attempts>,
}

#[derive(Debug, Clone, Copy)]
struct Attempts {
    requeues: u32,
    first: Instant,
}

impl RedeliveryTracker {
    pub fn new(max_redeliveries: u32, window: Duration) -> Self {
        Self {
            max_redeliveries,
            window,
            counts: HashMap::new(),
        }
    }

    /// Stable fingerprint of a message body.
    pub fn fingerprint(body: &[u8]) -> u64 {
        let mut hasher = DefaultHasher::new();
        body.hash(&mut hasher);
        hasher.finish()
    }

    /// Applies the ceiling to a handler's decision taken at `now`.
    ///
    /// `RejectRequeue` is counted and downgraded to `RejectDiscard` once the
    /// message has been requeued `max_redeliveries` times over at least the
    /// window. Any other decision settles the message and clears its
    /// counter.
    pub fn apply(&mut self, fingerprint: u64, decision: AckDecision, now: Instant) -> AckDecision {
        if decision != AckDecision::RejectRequeue {
            self.counts.remove(&fingerprint);
            return decision;
        }

        let attempts = self.counts.get(&fingerprint).copied().unwrap_or(Attempts {
            requeues: 0,
            first: now,
        });
        if attempts.requeues >= self.max_redeliveries
            && now.saturating_duration_since(attempts.first) >= self.window
        {
            self.counts.remove(&fingerprint);
            return AckDecision::RejectDiscard;
        }

        if self.counts.len() >= TRACKER_CAPACITY && !self.counts.contains_key(&fingerprint) {
            tracing::debug!(entries = self.counts.len(), "redelivery tracker full, resetting");
            self.counts.clear();
        }
        self.counts.insert(
            fingerprint,
            Attempts {
                requeues: attempts.requeues.saturating_add(1),
                ..attempts
            },
        );
        AckDecision::RejectRequeue
    }

    /// Number of requeues recorded for a fingerprint.
    pub fn requeues(&self, fingerprint: u64) -> u32 {
        self.counts.get(&fingerprint).map_or(0, |a| a.requeues)
    }
}
