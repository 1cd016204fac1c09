//! Event, filter and subscription values
//!
//! The manager never interprets these beyond serializing them: events arrive
//! already signed, and filters are matched by the relays.

use crate::core::url::RelayUrl;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A signed event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Lowercase hex sha256 of the serialized event data
    pub id: String,
    /// Lowercase hex public key of the author
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Lowercase hex signature
    pub sig: String,
}

/// Query matched by relays against stored and newly published events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Referenced event ids (`#e` tag)
    #[serde(rename = "#e", skip_serializing_if = "Option::is_none")]
    pub event_refs: Option<Vec<String>>,

    /// Referenced pubkeys (`#p` tag)
    #[serde(rename = "#p", skip_serializing_if = "Option::is_none")]
    pub pubkey_refs: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn event_refs(mut self, event_ids: Vec<String>) -> Self {
        self.event_refs = Some(event_ids);
        self
    }

    pub fn pubkey_refs(mut self, pubkeys: Vec<String>) -> Self {
        self.pubkey_refs = Some(pubkeys);
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Generate a random 16-character hex subscription id
pub fn generate_subscription_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A standing query, retained until explicitly unsubscribed
///
/// `target_relays = None` means every relay that is (or later becomes)
/// connected, except those in `excluded`. `excluded` only applies to that
/// open scope; an explicit scope is narrowed by removing from it instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub filters: Vec<Filter>,
    pub target_relays: Option<HashSet<RelayUrl>>,
    pub excluded: HashSet<RelayUrl>,
}

impl Subscription {
    /// Create a subscription with a generated id
    pub fn new(filters: Vec<Filter>) -> Self {
        Self::with_id(generate_subscription_id(), filters)
    }

    /// Create a subscription with a caller-chosen id
    pub fn with_id(id: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self {
            id: id.into(),
            filters,
            target_relays: None,
            excluded: HashSet::new(),
        }
    }

    /// Whether this subscription should be active on `url`
    pub fn targets(&self, url: &RelayUrl) -> bool {
        match &self.target_relays {
            Some(targets) => targets.contains(url),
            None => !self.excluded.contains(url),
        }
    }

    /// Stop targeting `relays`
    ///
    /// Returns `false` once an explicit scope has no relay left. An open
    /// scope never runs out: relays desired later are still targeted.
    pub fn narrow<'a>(&mut self, relays: impl IntoIterator<Item = &'a RelayUrl>) -> bool {
        match &mut self.target_relays {
            Some(targets) => {
                for url in relays {
                    targets.remove(url);
                }
                !targets.is_empty()
            }
            None => {
                self.excluded.extend(relays.into_iter().cloned());
                true
            }
        }
    }
}
