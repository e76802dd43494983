//! In-memory event repository and query planner.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use crate::bucket::{BucketIter, EventBucket};
use crate::event::{cmp_events, Event, StoredEvent, DELETION_KIND};
use crate::filter::Filter;
use crate::index::{Candidates, SecondaryIndex};
use crate::replaceable::ReplaceableTracker;

/// Outcome of offering an event to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored,
    /// The id is already present and live.
    Duplicate,
    /// The id was deleted earlier and stays rejected.
    Deleted,
}

/// All live relay state: the id map, the global bucket, four secondary
/// indices, the replaceable tracker, and the deleted-id set.
#[derive(Debug, Default)]
pub struct Repository {
    events_by_id: HashMap<String, Arc<StoredEvent>>,
    all_events: EventBucket,
    by_author: SecondaryIndex<String>,
    by_kind: SecondaryIndex<u32>,
    by_e_tag: SecondaryIndex<String>,
    by_p_tag: SecondaryIndex<String>,
    replaceable: ReplaceableTracker,
    deleted_ids: HashSet<String>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a shape- and semantics-checked, non-ephemeral event.
    pub fn insert(&mut self, ev: &Event) -> InsertOutcome {
        debug_assert!(!ev.is_ephemeral());
        if let Some(existing) = self.events_by_id.get(&ev.id) {
            if !existing.is_deleted() {
                return InsertOutcome::Duplicate;
            }
        }
        if self.deleted_ids.contains(&ev.id) {
            return InsertOutcome::Deleted;
        }
        if ev.kind == DELETION_KIND {
            self.apply_deletion(ev);
            return InsertOutcome::Stored;
        }
        if let Some(addr) = ev.address() {
            let rep = self.replaceable.replace(addr, ev);
            if let Some(winner) = rep.to_store {
                self.store(winner);
            }
            if let Some(loser) = rep.overwritten {
                tracing::debug!(addr = %rep.addr, superseded = %loser.id, "replaceable slot updated");
                self.delete_by_id(&loser.id, &ev.pubkey);
            }
            return InsertOutcome::Stored;
        }
        self.store(ev.clone());
        InsertOutcome::Stored
    }

    /// A deletion event is stored like any regular event, then retracts
    /// its `e`-tag ids and `a`-tag addresses.
    fn apply_deletion(&mut self, ev: &Event) {
        self.store(ev.clone());
        let targets: Vec<String> = ev.tag_values("e").map(str::to_string).collect();
        for id in targets {
            if self.delete_by_id(&id, &ev.pubkey) {
                self.deleted_ids.insert(id);
            }
        }
        let addrs: Vec<String> = ev.tag_values("a").map(str::to_string).collect();
        for addr in addrs {
            self.delete_by_addr(&addr, &ev.pubkey);
        }
    }

    /// Wrap and wire one event into every structure. The same `Arc` goes
    /// everywhere so the deletion flag stays in sync.
    fn store(&mut self, ev: Event) {
        let mev = StoredEvent::new(ev);
        self.events_by_id.insert(mev.event.id.clone(), mev.clone());
        self.all_events.insert(mev.clone());
        self.by_author.insert(mev.event.pubkey.clone(), mev.clone());
        self.by_kind.insert(mev.event.kind, mev.clone());
        for v in mev.event.tag_values("e") {
            self.by_e_tag.insert(v.to_string(), mev.clone());
        }
        for v in mev.event.tag_values("p") {
            self.by_p_tag.insert(v.to_string(), mev.clone());
        }
    }

    /// Flag an event deleted. Refuses absent ids, foreign requesters, and
    /// deletion events themselves.
    pub fn delete_by_id(&mut self, id: &str, requester: &str) -> bool {
        let Some(mev) = self.events_by_id.get(id) else {
            return false;
        };
        if mev.event.pubkey != requester || mev.event.kind == DELETION_KIND {
            return false;
        }
        mev.mark_deleted();
        true
    }

    /// Retract the tracked event at `addr` when it belongs to `requester`.
    fn delete_by_addr(&mut self, addr: &str, requester: &str) {
        let owned = matches!(self.replaceable.get(addr), Some(ev) if ev.pubkey == requester);
        if !owned {
            return;
        }
        if let Some(removed) = self.replaceable.delete(addr) {
            self.delete_by_id(&removed.id, requester);
        }
    }

    /// Events matching any of the filters, newest first per filter.
    ///
    /// Each filter contributes up to its own capped limit; results of
    /// distinct filters are concatenated without cross-filter dedup.
    pub fn query(&self, filters: &[Filter]) -> Vec<Event> {
        let mut out = Vec::new();
        for filter in filters {
            if filter.is_unsatisfiable() || filter.limit == Some(0) {
                continue;
            }
            self.query_one(filter, &mut out);
        }
        out
    }

    fn query_one(&self, filter: &Filter, out: &mut Vec<Event>) {
        let limit = filter.effective_limit();
        let buckets = self.select_buckets(filter);
        match buckets.len() {
            0 => {}
            1 => out.extend(buckets[0].query(filter).take(limit).map(|m| m.event.clone())),
            _ => self.merge_buckets(&buckets, filter, limit, out),
        }
    }

    /// Pick the cheapest index for one filter.
    ///
    /// `ids` queries scan the global bucket: the id test in the predicate
    /// is cheap and no id index exists. Otherwise the set field with the
    /// smallest combined bucket size wins, ties broken by fewer buckets.
    fn select_buckets(&self, filter: &Filter) -> Vec<&EventBucket> {
        if filter.ids.is_some() {
            return vec![&self.all_events];
        }
        let mut best: Option<Candidates> = None;
        if let Some(authors) = &filter.authors {
            consider(&mut best, self.by_author.candidates(authors));
        }
        if let Some(kinds) = &filter.kinds {
            consider(&mut best, self.by_kind.candidates(kinds));
        }
        if let Some(vals) = filter.tag_filter('e') {
            consider(&mut best, self.by_e_tag.candidates(vals));
        }
        if let Some(vals) = filter.tag_filter('p') {
            consider(&mut best, self.by_p_tag.candidates(vals));
        }
        match best {
            None => vec![&self.all_events],
            Some(c) => c.buckets,
        }
    }

    /// Merge several bucket walks newest-first via a max-heap, deduping
    /// ids within this merge.
    fn merge_buckets(
        &self,
        buckets: &[&EventBucket],
        filter: &Filter,
        limit: usize,
        out: &mut Vec<Event>,
    ) {
        let mut cursors: Vec<BucketIter> = buckets.iter().map(|b| b.query(filter)).collect();
        let mut heap = BinaryHeap::with_capacity(cursors.len());
        for (src, cursor) in cursors.iter_mut().enumerate() {
            if let Some(mev) = cursor.next() {
                heap.push(MergeHead { mev, src });
            }
        }
        let mut seen: HashSet<String> = HashSet::new();
        let mut taken = 0;
        while let Some(MergeHead { mev, src }) = heap.pop() {
            if let Some(next) = cursors[src].next() {
                heap.push(MergeHead { mev: next, src });
            }
            if seen.insert(mev.event.id.clone()) {
                out.push(mev.event.clone());
                taken += 1;
                if taken == limit {
                    break;
                }
            }
        }
    }
}

/// Keep `c` as the new `best` when it is cheaper (smaller combined size,
/// ties broken by fewer buckets).
fn consider<'a>(best: &mut Option<Candidates<'a>>, c: Candidates<'a>) {
    let better = match best {
        Some(b) => (c.total, c.buckets.len()) < (b.total, b.buckets.len()),
        None => true,
    };
    if better {
        *best = Some(c);
    }
}

/// Heap entry holding one bucket cursor's current head. The cursor itself
/// stays outside the heap; only its slot index travels with the event.
struct MergeHead {
    mev: Arc<StoredEvent>,
    src: usize,
}

impl PartialEq for MergeHead {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeHead {}

impl PartialOrd for MergeHead {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeHead {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_events(&self.mev.event, &other.mev.event).then_with(|| other.src.cmp(&self.src))
    }
}
