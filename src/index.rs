//! Secondary indices mapping a key to its event bucket.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::bucket::EventBucket;
use crate::event::StoredEvent;

/// One secondary index: key → bucket of events carrying that key.
#[derive(Debug)]
pub struct SecondaryIndex<K: Eq + Hash> {
    buckets: HashMap<K, EventBucket>,
}

impl<K: Eq + Hash> Default for SecondaryIndex<K> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

/// Buckets selected for one filter field plus their combined size.
pub struct Candidates<'a> {
    pub buckets: Vec<&'a EventBucket>,
    pub total: usize,
}

impl<K: Eq + Hash> SecondaryIndex<K> {
    /// Insert under `key`, creating the bucket on first use.
    pub fn insert(&mut self, key: K, mev: Arc<StoredEvent>) {
        self.buckets.entry(key).or_default().insert(mev);
    }

    /// Buckets for the requested keys; missing keys are skipped.
    pub fn candidates(&self, keys: &[K]) -> Candidates<'_> {
        let mut buckets = Vec::new();
        let mut total = 0;
        for key in keys {
            if let Some(b) = self.buckets.get(key) {
                total += b.len();
                buckets.push(b);
            }
        }
        Candidates { buckets, total }
    }
}
