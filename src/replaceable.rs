//! Latest-wins tracking for replaceable event addresses.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::event::{cmp_events, Event};

/// Maps each replaceable address to its currently retained event.
#[derive(Debug, Default)]
pub struct ReplaceableTracker {
    current: HashMap<String, Event>,
}

/// What [`ReplaceableTracker::replace`] decided for an incoming event.
pub struct Replacement {
    pub addr: String,
    /// Previously retained event that just lost its slot.
    pub overwritten: Option<Event>,
    /// Event to admit into storage, if the newcomer won.
    pub to_store: Option<Event>,
}

impl ReplaceableTracker {
    /// Offer `ev` for the slot at `addr`.
    pub fn replace(&mut self, addr: String, ev: &Event) -> Replacement {
        match self.current.get(&addr) {
            None => {
                self.current.insert(addr.clone(), ev.clone());
                Replacement {
                    addr,
                    overwritten: None,
                    to_store: Some(ev.clone()),
                }
            }
            Some(existing) => {
                if cmp_events(ev, existing) == Ordering::Greater {
                    let old = self.current.insert(addr.clone(), ev.clone());
                    Replacement {
                        addr,
                        overwritten: old,
                        to_store: Some(ev.clone()),
                    }
                } else {
                    Replacement {
                        addr,
                        overwritten: None,
                        to_store: None,
                    }
                }
            }
        }
    }

    /// Currently retained event for `addr`.
    pub fn get(&self, addr: &str) -> Option<&Event> {
        self.current.get(addr)
    }

    /// Remove and return the entry for `addr`.
    pub fn delete(&mut self, addr: &str) -> Option<Event> {
        self.current.remove(addr)
    }
}
