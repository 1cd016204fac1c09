//! Per-relay health records
//!
//! One record per URL that has ever been desired. Records are never removed,
//! only mutated, for the life of the manager. The tracker is owned by the
//! manager actor; callers only ever see cloned snapshots.

use crate::core::url::RelayUrl;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Observable connection status of one relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Connecting,
    Connected,
    WaitingRetry,
    Disconnected,
}

/// Status record for diagnostics and status UIs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayHealth {
    pub url: RelayUrl,
    pub status: RelayStatus,
    pub retry_attempt: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub next_retry: Option<DateTime<Utc>>,
    pub error_description: Option<String>,
    pub active_subscriptions: usize,
}

impl RelayHealth {
    fn new(url: RelayUrl) -> Self {
        Self {
            url,
            status: RelayStatus::Disconnected,
            retry_attempt: 0,
            last_success: None,
            last_failure: None,
            next_retry: None,
            error_description: None,
            active_subscriptions: 0,
        }
    }
}

fn retry_deadline(delay: Duration) -> Option<DateTime<Utc>> {
    let delay = chrono::Duration::from_std(delay).ok()?;
    Utc::now().checked_add_signed(delay)
}

/// Health table keyed by relay URL
#[derive(Debug, Default)]
pub struct HealthTracker {
    records: HashMap<RelayUrl, RelayHealth>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, url: &RelayUrl) -> &mut RelayHealth {
        self.records
            .entry(url.clone())
            .or_insert_with(|| RelayHealth::new(url.clone()))
    }

    /// A fresh open attempt was started because the URL became desired
    pub fn mark_connecting(&mut self, url: &RelayUrl) {
        let record = self.entry(url);
        record.status = RelayStatus::Connecting;
        record.retry_attempt = 0;
        record.error_description = None;
    }

    /// A retry timer fired and a new open attempt is underway
    pub fn mark_retrying(&mut self, url: &RelayUrl) {
        let record = self.entry(url);
        record.status = RelayStatus::Connecting;
        record.next_retry = None;
    }

    pub fn mark_connected(&mut self, url: &RelayUrl) {
        let record = self.entry(url);
        record.status = RelayStatus::Connected;
        record.retry_attempt = 0;
        record.next_retry = None;
        record.error_description = None;
        record.last_success = Some(Utc::now());
    }

    /// A live connection or an open attempt failed
    pub fn mark_failed(&mut self, url: &RelayUrl, error: &str) {
        let record = self.entry(url);
        record.last_failure = Some(Utc::now());
        record.error_description = Some(error.to_string());
        record.active_subscriptions = 0;
    }

    /// A retry timer was armed
    ///
    /// `error` overrides the stored description when present and leaves it
    /// unchanged otherwise.
    pub fn mark_waiting_retry(&mut self, url: &RelayUrl, attempt: u32, delay: Duration, error: Option<&str>) {
        let record = self.entry(url);
        record.status = RelayStatus::WaitingRetry;
        record.retry_attempt = attempt;
        record.next_retry = retry_deadline(delay);
        if let Some(error) = error {
            record.error_description = Some(error.to_string());
        }
    }

    /// The URL is no longer desired (or the whole manager disconnected)
    pub fn mark_disconnected(&mut self, url: &RelayUrl) {
        let record = self.entry(url);
        record.status = RelayStatus::Disconnected;
        record.retry_attempt = 0;
        record.active_subscriptions = 0;
        record.next_retry = None;
        record.error_description = None;
    }

    pub fn set_active_subscriptions(&mut self, url: &RelayUrl, count: usize) {
        if let Some(record) = self.records.get_mut(url) {
            record.active_subscriptions = count;
        }
    }

    pub fn urls(&self) -> Vec<RelayUrl> {
        self.records.keys().cloned().collect()
    }

    pub fn get(&self, url: &RelayUrl) -> Option<RelayHealth> {
        self.records.get(url).cloned()
    }

    /// All records, sorted by URL
    pub fn snapshot(&self) -> Vec<RelayHealth> {
        let mut records: Vec<RelayHealth> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> RelayUrl {
        RelayUrl::new("wss://relay.example.com")
    }

    #[test]
    fn test_records_created_lazily() {
        let mut tracker = HealthTracker::new();
        assert!(tracker.get(&url()).is_none());

        tracker.mark_connecting(&url());
        let record = tracker.get(&url()).unwrap();
        assert_eq!(record.status, RelayStatus::Connecting);
        assert_eq!(record.retry_attempt, 0);
    }

    #[test]
    fn test_waiting_retry_sets_future_next_retry() {
        let mut tracker = HealthTracker::new();
        tracker.mark_connecting(&url());
        tracker.mark_failed(&url(), "connection refused");

        let before = Utc::now();
        tracker.mark_waiting_retry(&url(), 3, Duration::from_secs(4), None);
        let record = tracker.get(&url()).unwrap();

        assert_eq!(record.status, RelayStatus::WaitingRetry);
        assert_eq!(record.retry_attempt, 3);
        assert!(record.next_retry.unwrap() > before);
        assert_eq!(record.error_description.as_deref(), Some("connection refused"));
        assert!(record.last_failure.is_some());
    }

    #[test]
    fn test_connected_resets_retry_fields() {
        let mut tracker = HealthTracker::new();
        tracker.mark_waiting_retry(&url(), 5, Duration::from_secs(16), Some("timeout"));
        tracker.mark_connected(&url());

        let record = tracker.get(&url()).unwrap();
        assert_eq!(record.status, RelayStatus::Connected);
        assert_eq!(record.retry_attempt, 0);
        assert!(record.next_retry.is_none());
        assert!(record.last_success.is_some());
    }

    #[test]
    fn test_disconnected_clears_counters() {
        let mut tracker = HealthTracker::new();
        tracker.mark_connected(&url());
        tracker.set_active_subscriptions(&url(), 4);
        tracker.mark_disconnected(&url());

        let record = tracker.get(&url()).unwrap();
        assert_eq!(record.status, RelayStatus::Disconnected);
        assert_eq!(record.active_subscriptions, 0);
        assert!(record.error_description.is_none());
        assert!(record.last_success.is_some());
    }

    #[test]
    fn test_snapshot_sorted_by_url() {
        let mut tracker = HealthTracker::new();
        tracker.mark_connecting(&RelayUrl::new("wss://b.example"));
        tracker.mark_connecting(&RelayUrl::new("wss://a.example"));

        let urls: Vec<String> = tracker.snapshot().into_iter().map(|r| r.url.to_string()).collect();
        assert_eq!(urls, vec!["wss://a.example", "wss://b.example"]);
    }
}
