//! Retry policy for failed deliveries.
//!
//! Backoff starts at 5 minutes and doubles on every subsequent failure. The
//! policy never caps the delay on its own; `max_retries` is what ends the
//! retry loop.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::agent::action::ScheduledAction;

/// Exponential backoff with a retry ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Backoff applied after the first failure.
    pub initial_minutes: u32,
    /// Growth factor applied after every later failure.
    pub multiplier: u32,
    /// Actions are abandoned once their retry count reaches this value.
    pub max_retries: u32,
    /// Optional ceiling on a single backoff step. `None` keeps growth unbounded.
    pub max_backoff_minutes: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_minutes: 5,
            multiplier: 2,
            max_retries: 3,
            max_backoff_minutes: None,
        }
    }
}

impl BackoffPolicy {
    /// Cap each backoff step.
    pub fn with_max_backoff(mut self, minutes: u32) -> Self {
        self.max_backoff_minutes = Some(minutes);
        self
    }

    /// Backoff that follows `current` (0 means no failure yet).
    pub fn next_backoff_minutes(&self, current: u32) -> u32 {
        let next = if current == 0 {
            self.initial_minutes
        } else {
            current.saturating_mul(self.multiplier)
        };
        match self.max_backoff_minutes {
            Some(cap) => next.min(cap),
            None => next,
        }
    }

    /// Whether an action with this many failed attempts should be dropped.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// Push an action's due time out after a failed delivery.
    ///
    /// `backoff_minutes` grows, `retry_count` goes up by one and the new due
    /// time is measured from `now`, not from the previous due time.
    pub fn apply(&self, action: &mut ScheduledAction, now: DateTime<Utc>) {
        action.backoff_minutes = self.next_backoff_minutes(action.backoff_minutes);
        action.due_time = now + ChronoDuration::minutes(i64::from(action.backoff_minutes));
        action.retry_count += 1;
    }
}
