//! Replier core: watches monitored accounts and answers their new posts.
//!
//! Accounts are polled every `reply_check_interval`. A post id that differs
//! from the last one seen for that account (including the first one ever
//! seen) gets a reply scheduled no earlier than `now + reply_lead` and no
//! earlier than the latest pending reply plus `reply_spacing`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::agent::{ActionKind, ActionRegistry, CoreUnit, ScheduledAction, bounded};
use crate::config::SchedulePolicy;
use crate::content::ContentGenerator;
use crate::error::{ContentError, DeliveryError, UnitError};
use crate::social::{DeliveryClient, RemotePost, TimelineReader};
use crate::units::{load_target_accounts, log_abandoned};

pub struct ReplierUnit {
    name: String,
    schedule: SchedulePolicy,
    generator: Arc<dyn ContentGenerator>,
    delivery: Arc<dyn DeliveryClient>,
    timeline: Arc<dyn TimelineReader>,
    accounts_path: PathBuf,
    accounts: Vec<String>,
    registry: ActionRegistry,
    /// Most recent post id observed per account.
    last_seen: HashMap<String, String>,
    last_check: Option<DateTime<Utc>>,
}

impl ReplierUnit {
    pub fn new(
        name: &str,
        schedule: SchedulePolicy,
        generator: Arc<dyn ContentGenerator>,
        delivery: Arc<dyn DeliveryClient>,
        timeline: Arc<dyn TimelineReader>,
        accounts_path: PathBuf,
    ) -> Self {
        Self {
            name: name.to_string(),
            schedule,
            generator,
            delivery,
            timeline,
            accounts_path,
            accounts: Vec::new(),
            registry: ActionRegistry::new(),
            last_seen: HashMap::new(),
            last_check: None,
        }
    }

    /// Watch these accounts instead of reading the accounts file.
    pub fn with_accounts<I, S>(mut self, accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accounts = accounts.into_iter().map(Into::into).collect();
        self
    }

    /// Treat `post_id` as already seen for `handle`.
    pub fn with_last_seen(mut self, handle: &str, post_id: &str) -> Self {
        self.last_seen
            .insert(handle.to_string(), post_id.to_string());
        self
    }

    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn last_seen(&self, handle: &str) -> Option<&str> {
        self.last_seen.get(handle).map(String::as_str)
    }

    fn check_due(&self, now: DateTime<Utc>) -> bool {
        let interval = chrono::Duration::from_std(self.schedule.reply_check_interval)
            .unwrap_or_else(|_| chrono::Duration::minutes(90));
        self.last_check.is_none_or(|last| now - last >= interval)
    }

    fn next_reply_due(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lead = chrono::Duration::from_std(self.schedule.reply_lead)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let spacing = chrono::Duration::from_std(self.schedule.reply_spacing)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));

        let earliest = now + lead;
        match self.registry.latest_due_time(&self.schedule.backoff) {
            Some(latest) => earliest.max(latest + spacing),
            None => earliest,
        }
    }

    /// Poll every account once. A rate limit ends the sweep early and is
    /// returned as the tick's error.
    async fn sweep(&mut self, now: DateTime<Utc>) -> Result<(), UnitError> {
        let limit = self.schedule.external_call_timeout;
        let service = self.timeline.name().to_string();

        for handle in self.accounts.clone() {
            let result = bounded(limit, self.timeline.latest_post(&handle), |timeout| {
                DeliveryError::Timeout {
                    service: service.clone(),
                    timeout,
                }
            })
            .await;

            match result {
                Ok(Some(post)) => self.observe(&handle, post, now),
                Ok(None) => tracing::debug!("Core {}: no posts from @{}", self.name, handle),
                Err(e) if e.is_rate_limited() => {
                    return Err(UnitError::TickFailed {
                        name: self.name.clone(),
                        reason: format!("sweep ended early at @{}: {}", handle, e),
                    });
                }
                Err(e) => {
                    tracing::warn!("Core {} failed to check @{}: {}", self.name, handle, e);
                }
            }
        }
        Ok(())
    }

    fn observe(&mut self, handle: &str, post: RemotePost, now: DateTime<Utc>) {
        if self.last_seen.get(handle) == Some(&post.id) {
            tracing::debug!("Core {}: nothing new from @{}", self.name, handle);
            return;
        }

        let due = self.next_reply_due(now);
        tracing::info!(
            "Core {} found new post {} from @{}, reply scheduled for {}",
            self.name,
            post.id,
            handle,
            due.to_rfc3339()
        );
        self.last_seen.insert(handle.to_string(), post.id.clone());
        self.registry
            .enqueue(ScheduledAction::reply(due, handle, post.id, post.text));
    }

    async fn process_replies(&mut self, now: DateTime<Utc>) {
        let policy = self.schedule.backoff.clone();
        let limit = self.schedule.external_call_timeout;

        for action in self.registry.live_mut(&policy) {
            let ActionKind::Reply {
                target_account,
                source_post_id,
                source_text,
            } = action.kind.clone()
            else {
                continue;
            };

            let generator = &self.generator;
            match action
                .materialize_content(|| {
                    bounded(
                        limit,
                        generator.generate_reply(&source_text, &target_account),
                        ContentError::Timeout,
                    )
                })
                .await
            {
                Ok(true) => tracing::info!(
                    "Core {} generated reply to @{} ({})",
                    self.name,
                    target_account,
                    source_post_id
                ),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "Core {} failed to generate reply to @{}: {}",
                        self.name,
                        target_account,
                        e
                    );
                    continue;
                }
            }

            if !action.ready_to_send(now, &policy) {
                continue;
            }
            let Some(text) = action.content.clone() else {
                continue;
            };

            let service = self.delivery.name().to_string();
            let result = bounded(
                limit,
                self.delivery.reply(&text, &source_post_id),
                |timeout| DeliveryError::Timeout { service, timeout },
            )
            .await;

            match result {
                Ok(id) => {
                    action.mark_sent();
                    tracing::info!(
                        "Core {} replied to @{} ({}) with {}: {}",
                        self.name,
                        target_account,
                        source_post_id,
                        id,
                        text
                    );
                }
                Err(e) => {
                    action.record_failure(e.to_string(), &policy, now);
                    tracing::warn!(
                        "Core {} failed to reply to @{} (attempt {}, retry at {}): {}",
                        self.name,
                        target_account,
                        action.retry_count,
                        action.due_time.to_rfc3339(),
                        e
                    );
                }
            }
        }

        let report = self.registry.prune(&policy);
        log_abandoned(&self.name, &report);
    }
}

#[async_trait]
impl CoreUnit for ReplierUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&mut self) -> Result<(), UnitError> {
        let init_failed = |reason: String| UnitError::InitFailed {
            name: self.name.clone(),
            reason,
        };
        self.generator
            .prepare()
            .await
            .map_err(|e| init_failed(e.to_string()))?;
        self.delivery
            .ensure_ready()
            .await
            .map_err(|e| init_failed(e.to_string()))?;
        self.timeline
            .ensure_ready()
            .await
            .map_err(|e| init_failed(e.to_string()))?;

        if self.accounts.is_empty() {
            self.accounts = load_target_accounts(&self.accounts_path);
        }
        self.last_check = Some(Utc::now());

        tracing::info!(
            "Core {} watching {} account(s) via {}: {}",
            self.name,
            self.accounts.len(),
            self.timeline.name(),
            self.accounts.join(", ")
        );
        Ok(())
    }

    async fn tick(&mut self, now: DateTime<Utc>) -> Result<(), UnitError> {
        let swept = if self.check_due(now) {
            self.last_check = Some(now);
            self.sweep(now).await
        } else {
            Ok(())
        };
        self.process_replies(now).await;
        swept
    }

    async fn shutdown(&mut self) {
        let dropped = self.registry.pending_count(&self.schedule.backoff);
        if dropped > 0 {
            tracing::info!("Core {} dropping {} pending reply(ies)", self.name, dropped);
        }
        self.registry.clear();
        self.last_check = None;
    }

    fn pending_actions(&self) -> usize {
        self.registry.pending_count(&self.schedule.backoff)
    }
}
