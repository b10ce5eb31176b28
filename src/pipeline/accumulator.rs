// src/pipeline/accumulator.rs

//! Cross-run unique-set accumulator for one phone category.

use std::collections::HashSet;

use crate::models::PhoneKey;

/// Outcome of offering a key to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Added,
    AlreadyPresent,
}

/// Owns the deduplicated set for one category.
///
/// Membership is O(1); first-seen insertion order is preserved because it
/// drives the checkpoint layout and merge tie-breaks.
#[derive(Debug, Default)]
pub struct UniqueAccumulator {
    seen: HashSet<PhoneKey>,
    order: Vec<PhoneKey>,
    target: usize,
}

impl UniqueAccumulator {
    pub fn new(target: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: Vec::new(),
            target,
        }
    }

    /// Seed from previously persisted keys, deduplicating defensively.
    pub fn from_keys(keys: impl IntoIterator<Item = PhoneKey>, target: usize) -> Self {
        let mut acc = Self::new(target);
        for key in keys {
            acc.offer(key);
        }
        acc
    }

    /// Offer a key; idempotent and valid even past the target, since a small
    /// overshoot is simpler than a hard cutoff mid-batch.
    pub fn offer(&mut self, key: PhoneKey) -> Offer {
        if self.seen.insert(key.clone()) {
            self.order.push(key);
            Offer::Added
        } else {
            Offer::AlreadyPresent
        }
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Advisory to the harvest loop: stop pulling new targets once true.
    pub fn target_reached(&self) -> bool {
        self.count() >= self.target
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> &[PhoneKey] {
        &self.order
    }
}
