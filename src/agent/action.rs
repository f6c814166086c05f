//! Scheduled actions owned by a core unit.
//!
//! An action is created with no content. Content is generated at most once,
//! the first time a tick sees the action without it; delivery only happens
//! once the action is due and has content.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::backoff::BackoffPolicy;

/// What an action will do once delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// A standalone post.
    Post,
    /// A reply to another account's post.
    Reply {
        target_account: String,
        source_post_id: String,
        source_text: String,
    },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Reply { .. } => "reply",
        }
    }
}

/// A unit of deferred work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: Uuid,
    pub kind: ActionKind,
    pub due_time: DateTime<Utc>,
    pub content: Option<String>,
    pub completed: bool,
    pub retry_count: u32,
    pub backoff_minutes: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle position of an action, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionState {
    /// Waiting for content to be generated.
    PendingContent,
    /// Has content, waiting to become due (or to be retried).
    PendingSend,
    /// Delivered.
    Sent,
    /// Retries exhausted.
    Abandoned,
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingContent => write!(f, "pending_content"),
            Self::PendingSend => write!(f, "pending_send"),
            Self::Sent => write!(f, "sent"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl ScheduledAction {
    fn new(kind: ActionKind, due_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            due_time,
            content: None,
            completed: false,
            retry_count: 0,
            backoff_minutes: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// A new post action due at `due_time`.
    pub fn post(due_time: DateTime<Utc>) -> Self {
        Self::new(ActionKind::Post, due_time)
    }

    /// A new reply action due at `due_time`.
    pub fn reply(
        due_time: DateTime<Utc>,
        target_account: impl Into<String>,
        source_post_id: impl Into<String>,
        source_text: impl Into<String>,
    ) -> Self {
        Self::new(
            ActionKind::Reply {
                target_account: target_account.into(),
                source_post_id: source_post_id.into(),
                source_text: source_text.into(),
            },
            due_time,
        )
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_time <= now
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Whether the tick loop should still look at this action.
    pub fn is_live(&self, policy: &BackoffPolicy) -> bool {
        !self.completed && !policy.is_exhausted(self.retry_count)
    }

    /// Whether the action is due, has content and is still live.
    pub fn ready_to_send(&self, now: DateTime<Utc>, policy: &BackoffPolicy) -> bool {
        self.is_live(policy) && self.has_content() && self.is_due(now)
    }

    pub fn state(&self, policy: &BackoffPolicy) -> ActionState {
        if self.completed {
            ActionState::Sent
        } else if policy.is_exhausted(self.retry_count) {
            ActionState::Abandoned
        } else if self.content.is_none() {
            ActionState::PendingContent
        } else {
            ActionState::PendingSend
        }
    }

    /// Generate content if the action has none yet.
    ///
    /// `generate` is not called when content is already present. Returns
    /// `Ok(true)` when new content was stored. On error the action is left
    /// without content so a later tick tries again.
    pub async fn materialize_content<F, Fut, E>(&mut self, generate: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if self.content.is_some() {
            return Ok(false);
        }
        let text = generate().await?;
        self.content = Some(text);
        Ok(true)
    }

    /// Record a successful delivery. Retry state is reset.
    pub fn mark_sent(&mut self) {
        self.completed = true;
        self.retry_count = 0;
        self.backoff_minutes = 0;
        self.last_error = None;
    }

    /// Record a failed delivery and push the due time out.
    pub fn record_failure(
        &mut self,
        reason: impl Into<String>,
        policy: &BackoffPolicy,
        now: DateTime<Utc>,
    ) {
        self.last_error = Some(reason.into());
        policy.apply(self, now);
    }
}
