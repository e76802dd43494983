//! Nostr event model, kind classification, and signature checks.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as MemOrdering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use secp256k1::{schnorr::Signature, Message, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Kind number of deletion events.
pub const DELETION_KIND: u32 = 5;

/// Simple tag wrapper preserving tag fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Tag name, i.e. the first field.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(|s| s.as_str())
    }

    /// Tag value, i.e. the second field.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(|s| s.as_str())
    }
}

/// Core Nostr event received from clients and held in memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Kind number, e.g. `1` or `30023`.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Arbitrary tags.
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

/// Storage class derived from an event's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Stored until deleted.
    Regular,
    /// One retained per (kind, pubkey).
    Replaceable,
    /// One retained per (kind, pubkey, d-tag value).
    ParamReplaceable,
    /// Never stored, only broadcast.
    Ephemeral,
}

/// Semantic checks applied after shape and signature validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SemanticError {
    #[error("no d-tag in parametarized replaceable event")]
    MissingDTag,
}

impl Event {
    /// Classify the event by kind.
    pub fn class(&self) -> EventClass {
        match self.kind {
            0 | 3 | 10_000..=19_999 => EventClass::Replaceable,
            20_000..=29_999 => EventClass::Ephemeral,
            30_000..=39_999 => EventClass::ParamReplaceable,
            _ => EventClass::Regular,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.class() == EventClass::Ephemeral
    }

    /// Value of the first `d` tag, if any.
    pub fn d_tag(&self) -> Option<&str> {
        self.tag_values("d").next()
    }

    /// Values of every tag named `name` that carries one.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |t| t.name() == Some(name))
            .filter_map(|t| t.value())
    }

    /// Canonical `kind:pubkey:d` address for replaceable events.
    ///
    /// `d` is empty for the non-parameterized flavor. Returns `None` for
    /// regular and ephemeral kinds.
    pub fn address(&self) -> Option<String> {
        match self.class() {
            EventClass::Replaceable => Some(format!("{}:{}:", self.kind, self.pubkey)),
            EventClass::ParamReplaceable => Some(format!(
                "{}:{}:{}",
                self.kind,
                self.pubkey,
                self.d_tag().unwrap_or_default()
            )),
            _ => None,
        }
    }

    /// Check hex field lengths and casing.
    pub fn has_valid_shape(&self) -> bool {
        is_lower_hex(&self.id, 64) && is_lower_hex(&self.pubkey, 64) && is_lower_hex(&self.sig, 128)
    }

    /// Validate constraints that depend on the event's kind.
    pub fn check_semantics(&self) -> std::result::Result<(), SemanticError> {
        if self.class() == EventClass::ParamReplaceable && self.d_tag().is_none() {
            return Err(SemanticError::MissingDTag);
        }
        Ok(())
    }
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Total order used for sorting and replacement decisions.
///
/// Later `created_at` is greater; on a timestamp tie the event with the
/// lexicographically smaller id wins.
pub fn cmp_events(a: &Event, b: &Event) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// An admitted event plus its deletion flag.
///
/// Every bucket and index holds the same `Arc`, so flagging an event
/// deleted in one place is observed by all readers.
#[derive(Debug)]
pub struct StoredEvent {
    pub event: Event,
    deleted: AtomicBool,
}

impl StoredEvent {
    pub fn new(event: Event) -> Arc<Self> {
        Arc::new(Self {
            event,
            deleted: AtomicBool::new(false),
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(MemOrdering::Acquire)
    }

    pub fn mark_deleted(&self) {
        self.deleted.store(true, MemOrdering::Release);
    }
}

/// Recompute the Nostr event hash from its fields.
pub fn event_hash(ev: &Event) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, ev.pubkey, ev.created_at, ev.kind, ev.tags, ev.content]);
    let data = serde_json::to_vec(&arr)?;
    let hash = Sha256::digest(&data);
    Ok(hash.into())
}

/// Verify an event's ID and Schnorr signature.
pub fn verify_event(ev: &Event) -> Result<()> {
    let hash = event_hash(ev)?;
    let calc_id = hex::encode(hash);
    if calc_id != ev.id {
        return Err(anyhow!("id mismatch"));
    }
    let sig = Signature::from_slice(&hex::decode(&ev.sig)?)?;
    let pk = XOnlyPublicKey::from_slice(&hex::decode(&ev.pubkey)?)?;
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest_slice(&hash)?;
    secp.verify_schnorr(&sig, &msg, &pk)?;
    Ok(())
}
