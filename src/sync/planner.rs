//! Invalidation plan generation.
//!
//! Merges a batch of push events into one deduplicated set of stale-marking
//! actions. Redelivered events (same id) collapse, and a class-wide target
//! absorbs exact keys of the same class.

use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

use super::events::{InvalidationTarget, PushEvent};
use super::keys::{QueryKey, ResourceClass};
use super::store::ResourceCache;

/// Stale-marking actions distilled from a batch of events.
#[derive(Debug, Default)]
pub struct InvalidationPlan {
    pub stale_classes: HashSet<ResourceClass>,
    pub stale_keys: HashSet<QueryKey>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ classes: {}, keys: {} }}",
            self.stale_classes.len(),
            self.stale_keys.len(),
        )
    }
}

impl InvalidationPlan {
    /// Merge events into a plan, deduplicating by event id.
    pub fn from_events(events: Vec<PushEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids: HashSet<Uuid> = HashSet::new();

        for event in events {
            if !seen_ids.insert(event.id) {
                continue;
            }
            for target in event.targets() {
                match target {
                    InvalidationTarget::Class(class) => {
                        plan.stale_classes.insert(class);
                    }
                    InvalidationTarget::Key(key) => {
                        plan.stale_keys.insert(key);
                    }
                }
            }
        }

        // exact keys already covered by a class-wide mark are redundant
        plan.stale_keys
            .retain(|key| !plan.stale_classes.contains(&key.class()));
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.stale_classes.is_empty() && self.stale_keys.is_empty()
    }

    /// Execute the plan against the cache. Returns the keys actually marked.
    pub fn apply(&self, cache: &ResourceCache) -> Vec<QueryKey> {
        let mut marked = Vec::new();
        for class in &self.stale_classes {
            marked.extend(cache.mark_class_stale(*class));
        }
        for key in &self.stale_keys {
            if matches!(cache.mark_stale(key), Ok(true)) {
                marked.push(key.clone());
            }
        }
        marked
    }
}
