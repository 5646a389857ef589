//! Leaf frontiers: the heads of a stream's event DAG.
//!
//! The frontier is the set of event hashes not yet referenced as a
//! predecessor. New events name the whole frontier as their `prev_events`,
//! which merges concurrent branches.

use std::collections::BTreeSet;

use crate::error::ValidationError;
use crate::event::Event;
use crate::types::EventHash;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafFrontier {
    leaves: BTreeSet<EventHash>,
}

impl LeafFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the frontier of a stream from its events, in any order
    /// consistent with causality.
    pub fn from_events(events: &[Event]) -> Result<Self, ValidationError> {
        if events.is_empty() {
            return Err(ValidationError::StreamBadHashes(
                "cannot compute leaves of an empty stream".into(),
            ));
        }
        let mut frontier = Self::new();
        for event in events {
            frontier.fold(event);
        }
        if frontier.is_empty() {
            return Err(ValidationError::StreamBadHashes(
                "events reference each other in a cycle".into(),
            ));
        }
        Ok(frontier)
    }

    /// Add an event's hash as a leaf and retire its predecessors.
    pub fn fold(&mut self, event: &Event) {
        self.leaves.insert(event.hash);
        for prev in event.prev_events() {
            self.leaves.remove(prev);
        }
    }

    /// The leaves in sorted order.
    pub fn hashes(&self) -> Vec<EventHash> {
        self.leaves.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventHash> {
        self.leaves.iter()
    }

    pub fn contains(&self, hash: &EventHash) -> bool {
        self.leaves.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}
