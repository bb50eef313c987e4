//! Bounded memory of superseded roots.
//!
//! A witness that recomputes to a root the map held a moment ago was built
//! against an older state and only needs refreshing. One that recomputes to
//! a root the map never held is simply wrong. Keeping the most recent
//! superseded roots lets the controller tell the two apart.
//!
//! Memory stays predictable: once full, the oldest root is evicted.

use std::collections::{HashSet, VecDeque};

use lockchannel_types::Digest32;

/// Superseded roots of one map, evicted in insertion order.
#[derive(Debug, Clone)]
pub struct RootHistory {
    seen: HashSet<Digest32>,
    /// Insertion order (front = oldest).
    order: VecDeque<Digest32>,
    max_size: usize,
}

impl RootHistory {
    /// Create a history holding at most `max_size` roots (at least one).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            seen: HashSet::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Remember `root` as superseded.
    pub fn record(&mut self, root: Digest32) {
        if self.seen.contains(&root) {
            return;
        }
        if self.seen.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(root);
        self.order.push_back(root);
    }

    /// Whether `root` is among the remembered roots.
    #[must_use]
    pub fn contains(&self, root: &Digest32) -> bool {
        self.seen.contains(root)
    }

    /// Number of roots remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
