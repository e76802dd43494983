//! Shared relay core: ingestion, query serving, and subscription wiring.
//!
//! One mutex guards the repository and the pool together, so every inbound
//! message observes and mutates state in a single critical section.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::event::{verify_event, Event};
use crate::filter::Filter;
use crate::pool::{PeerId, Subscription, SubscriptionPool};
use crate::proto::{ClientSender, RelayMsg};
use crate::repo::{InsertOutcome, Repository};

/// Result reported back for a submitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub accepted: bool,
    pub message: String,
}

impl Ack {
    fn ok() -> Self {
        Self {
            accepted: true,
            message: String::new(),
        }
    }

    fn reject(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}

struct Core {
    repo: Repository,
    pool: SubscriptionPool,
}

/// The relay core shared by all connections.
pub struct Relay {
    core: Mutex<Core>,
    verify_sig: bool,
    next_peer: AtomicU64,
}

impl Relay {
    pub fn new(verify_sig: bool) -> Self {
        Self {
            core: Mutex::new(Core {
                repo: Repository::new(),
                pool: SubscriptionPool::default(),
            }),
            verify_sig,
            next_peer: AtomicU64::new(1),
        }
    }

    /// Hand out a fresh peer id for an accepted connection.
    pub fn register_peer(&self) -> PeerId {
        self.next_peer.fetch_add(1, Ordering::Relaxed)
    }

    /// Validate, persist, and fan out one submitted event.
    ///
    /// Broadcast happens only after a successful insert; duplicates and
    /// previously deleted ids never reach subscribers. Ephemeral events
    /// skip the repository entirely.
    pub fn ingest(&self, ev: &Event) -> Ack {
        if self.verify_sig {
            if let Err(err) = verify_event(ev) {
                tracing::debug!(id = %ev.id, %err, "rejecting event with bad signature");
                return Ack::reject("error: invalid signature");
            }
        }
        if let Err(err) = ev.check_semantics() {
            return Ack::reject(format!("error: {err}"));
        }
        let mut core = self.core.lock();
        if !ev.is_ephemeral() {
            match core.repo.insert(ev) {
                InsertOutcome::Duplicate => {
                    return Ack {
                        accepted: true,
                        message: "duplicate: already have this event".into(),
                    }
                }
                InsertOutcome::Deleted => {
                    return Ack::reject("error: already deleted this event")
                }
                InsertOutcome::Stored => {}
            }
        }
        core.pool.broadcast(ev);
        Ack::ok()
    }

    /// Serve a REQ: stream the stored backlog, close it with EOSE, then
    /// keep the effective filters live.
    ///
    /// Returns whether a subscription was registered. Everything happens
    /// under one lock acquisition so no event can slip between the
    /// backlog and live delivery.
    pub fn open_subscription(
        &self,
        peer: PeerId,
        sub_id: &str,
        filters: Vec<Filter>,
        sender: &ClientSender,
    ) -> bool {
        let mut core = self.core.lock();
        for event in core.repo.query(&filters) {
            sender.send(RelayMsg::Event {
                sub_id: sub_id.to_string(),
                event,
            });
        }
        sender.send(RelayMsg::Eose {
            sub_id: sub_id.to_string(),
        });
        let effective: Vec<Filter> = filters.into_iter().filter(Filter::is_effective).collect();
        if effective.is_empty() {
            sender.send(RelayMsg::Closed {
                sub_id: sub_id.to_string(),
                message: "error: no effective filter".into(),
            });
            return false;
        }
        core.pool.register(Subscription::new(
            peer,
            sub_id.to_string(),
            effective,
            sender.clone(),
        ));
        true
    }

    /// Drop one subscription.
    pub fn close_subscription(&self, peer: PeerId, sub_id: &str) {
        self.core.lock().pool.unregister(peer, sub_id);
    }

    /// Drop everything a departing peer had registered.
    pub fn drop_peer(&self, peer: PeerId) {
        self.core.lock().pool.unregister_peer(peer);
    }

    /// Number of live subscriptions across all peers.
    pub fn subscription_count(&self) -> usize {
        self.core.lock().pool.len()
    }
}
