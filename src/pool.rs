//! Live subscription registry and broadcast fan-out.

use std::collections::HashMap;

use crate::event::Event;
use crate::filter::Filter;
use crate::proto::{ClientSender, RelayMsg};

/// Connection identity assigned by the relay.
pub type PeerId = u64;

/// A standing client query bound to its connection's outbound queue.
pub struct Subscription {
    pub peer: PeerId,
    pub id: String,
    pub filters: Vec<Filter>,
    sender: ClientSender,
}

impl Subscription {
    pub fn new(peer: PeerId, id: String, filters: Vec<Filter>, sender: ClientSender) -> Self {
        Self {
            peer,
            id,
            filters,
            sender,
        }
    }

    /// Re-check the filters and forward the event when one matches.
    pub fn deliver(&self, ev: &Event) {
        if self.filters.iter().any(|f| f.matches(ev)) {
            self.sender.send(RelayMsg::Event {
                sub_id: self.id.clone(),
                event: ev.clone(),
            });
        }
    }
}

/// All live subscriptions keyed by (peer, subscription id).
#[derive(Default)]
pub struct SubscriptionPool {
    subs: HashMap<(PeerId, String), Subscription>,
}

impl SubscriptionPool {
    /// Register, replacing any earlier subscription under the same key.
    pub fn register(&mut self, sub: Subscription) {
        self.subs.insert((sub.peer, sub.id.clone()), sub);
    }

    /// Remove one subscription; absent keys are a no-op.
    pub fn unregister(&mut self, peer: PeerId, sub_id: &str) {
        self.subs.remove(&(peer, sub_id.to_string()));
    }

    /// Drop every subscription belonging to `peer`.
    pub fn unregister_peer(&mut self, peer: PeerId) {
        self.subs.retain(|(p, _), _| *p != peer);
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Offer a freshly admitted event to every live subscription.
    pub fn broadcast(&self, ev: &Event) {
        for sub in self.subs.values() {
            sub.deliver(ev);
        }
    }
}
