//! Subscription filter model and match predicate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Hard cap on events returned per filter.
pub const MAX_QUERY_LIMIT: usize = 500;

/// A conjunction of optional constraints over events.
///
/// Tag constraints arrive as `#x` fields and are captured by the flattened
/// map; only single-letter names are honored when matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(flatten)]
    pub tags: HashMap<String, Vec<String>>,
}

impl Filter {
    /// Number of events a query for this filter may return.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(MAX_QUERY_LIMIT).min(MAX_QUERY_LIMIT)
    }

    /// True when no event can ever match.
    pub fn is_unsatisfiable(&self) -> bool {
        if matches!(&self.ids, Some(v) if v.is_empty())
            || matches!(&self.authors, Some(v) if v.is_empty())
            || matches!(&self.kinds, Some(v) if v.is_empty())
        {
            return true;
        }
        if self.tag_entries().any(|(_, v)| v.is_empty()) {
            return true;
        }
        matches!((self.since, self.until), (Some(s), Some(u)) if s > u)
    }

    /// True when the filter should drive a live subscription.
    pub fn is_effective(&self) -> bool {
        !self.is_unsatisfiable() && self.limit != Some(0)
    }

    /// Accepted values for the `#name` tag constraint, if present.
    pub fn tag_filter(&self, name: char) -> Option<&Vec<String>> {
        self.tag_entries().find(|(c, _)| *c == name).map(|(_, v)| v)
    }

    /// Tag constraints with a single-letter name.
    fn tag_entries(&self) -> impl Iterator<Item = (char, &Vec<String>)> {
        self.tags.iter().filter_map(|(k, v)| {
            let mut chars = k.strip_prefix('#')?.chars();
            let c = chars.next()?;
            chars.next().is_none().then_some((c, v))
        })
    }

    /// Full conjunction test against one event.
    pub fn matches(&self, ev: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|i| *i == ev.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == ev.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&ev.kind) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if ev.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if ev.created_at > until {
                return false;
            }
        }
        for (name, accepted) in self.tag_entries() {
            let hit = ev.tags.iter().any(|t| {
                t.name().map_or(false, |n| n.len() == 1 && n.starts_with(name))
                    && t.value().map_or(false, |v| accepted.iter().any(|a| a == v))
            });
            if !hit {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            if !ev.content.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}
