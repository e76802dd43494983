//! Time-sorted event sequences with descending filtered iteration.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::event::{cmp_events, StoredEvent};
use crate::filter::Filter;

/// Events kept ascending in the event order, newest at the tail.
#[derive(Debug, Default)]
pub struct EventBucket {
    events: Vec<Arc<StoredEvent>>,
}

impl EventBucket {
    /// Append and sift backward until the ordering invariant holds.
    ///
    /// Arrivals are near-monotonic in `created_at`, so the sift usually
    /// stops after zero or one swap.
    pub fn insert(&mut self, mev: Arc<StoredEvent>) {
        self.events.push(mev);
        let mut i = self.events.len() - 1;
        while i > 0
            && cmp_events(&self.events[i - 1].event, &self.events[i].event) == Ordering::Greater
        {
            self.events.swap(i - 1, i);
            i -= 1;
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Matching, non-deleted events, newest first.
    pub fn query<'a>(&'a self, filter: &'a Filter) -> BucketIter<'a> {
        // Start at the newest entry not above `until`.
        let start = match filter.until {
            None => self.events.len() as isize - 1,
            Some(u) => self.events.partition_point(|m| m.event.created_at <= u) as isize - 1,
        };
        BucketIter {
            events: &self.events,
            filter,
            pos: start,
        }
    }
}

/// Descending walk over a bucket, bounded by the filter's time window.
pub struct BucketIter<'a> {
    events: &'a [Arc<StoredEvent>],
    filter: &'a Filter,
    pos: isize,
}

impl Iterator for BucketIter<'_> {
    type Item = Arc<StoredEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos >= 0 {
            let mev = &self.events[self.pos as usize];
            if let Some(since) = self.filter.since {
                if mev.event.created_at < since {
                    self.pos = -1;
                    return None;
                }
            }
            self.pos -= 1;
            if mev.is_deleted() {
                continue;
            }
            if self.filter.matches(&mev.event) {
                return Some(mev.clone());
            }
        }
        None
    }
}
