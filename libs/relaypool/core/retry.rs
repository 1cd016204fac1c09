//! Retry scheduling
//!
//! Each URL that is desired but neither connected nor opening owns a
//! `RetryState` with exactly one armed timer. Firing timers are delivered
//! to the manager as `ConnectionSignal::RetryDue`; a timer id check makes
//! cancelled or replaced timers harmless.

use crate::core::connection::ConnectionSignal;
use crate::core::url::RelayUrl;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

struct RetryState {
    attempt: u32,
    timer_id: u64,
    /// `None` once the timer has fired and the next open attempt is running
    timer: Option<JoinHandle<()>>,
}

impl RetryState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Per-URL reconnection timers and attempt counters
#[derive(Default)]
pub(crate) struct RetryScheduler {
    states: HashMap<RelayUrl, RetryState>,
    next_timer_id: u64,
}

impl RetryScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm the next retry timer for `url`
    ///
    /// Increments the attempt counter (starting at 1) and replaces any timer
    /// that is still pending, so at most one timer exists per URL.
    ///
    /// # Returns
    /// The new attempt number and the delay that was armed
    pub(crate) fn schedule(
        &mut self,
        url: &RelayUrl,
        delay_for: impl Fn(u32) -> Duration,
        signals: &UnboundedSender<ConnectionSignal>,
    ) -> (u32, Duration) {
        self.next_timer_id += 1;
        let timer_id = self.next_timer_id;

        let state = self.states.entry(url.clone()).or_insert(RetryState {
            attempt: 0,
            timer_id,
            timer: None,
        });
        state.cancel_timer();
        state.attempt = state.attempt.saturating_add(1);
        state.timer_id = timer_id;

        let delay = delay_for(state.attempt);
        let signals = signals.clone();
        let timer_url = url.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(ConnectionSignal::RetryDue {
                url: timer_url,
                timer_id,
            });
        }));

        debug!("Armed retry timer {} for {} in {:?}", timer_id, url, delay);
        (state.attempt, delay)
    }

    /// Accept a fired timer
    ///
    /// # Returns
    /// * `true` - The timer is current; the attempt counter is kept
    /// * `false` - The timer was cancelled or replaced
    pub(crate) fn take_due(&mut self, url: &RelayUrl, timer_id: u64) -> bool {
        match self.states.get_mut(url) {
            Some(state) if state.timer_id == timer_id && state.timer.is_some() => {
                state.timer = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_pending(&self, url: &RelayUrl) -> bool {
        self.states.get(url).map_or(false, |state| state.timer.is_some())
    }

    pub(crate) fn attempt(&self, url: &RelayUrl) -> u32 {
        self.states.get(url).map_or(0, |state| state.attempt)
    }

    /// Cancel any timer and forget the attempt counter
    pub(crate) fn clear(&mut self, url: &RelayUrl) {
        if let Some(mut state) = self.states.remove(url) {
            state.cancel_timer();
        }
    }

    pub(crate) fn clear_all(&mut self) {
        for (_, mut state) in self.states.drain() {
            state.cancel_timer();
        }
    }
}
