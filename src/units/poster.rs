//! Poster core: keeps exactly one self-authored post scheduled.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::agent::{ActionRegistry, CoreUnit, ScheduledAction, bounded};
use crate::config::{PostDelay, SchedulePolicy};
use crate::content::ContentGenerator;
use crate::error::{ContentError, DeliveryError, UnitError};
use crate::social::DeliveryClient;
use crate::units::log_abandoned;

/// Draw the delay before the next post.
pub fn draw_post_delay<R: rand::Rng + ?Sized>(delay: &PostDelay, rng: &mut R) -> chrono::Duration {
    match delay {
        PostDelay::Fixed(fixed) => {
            chrono::Duration::from_std(*fixed).unwrap_or_else(|_| chrono::Duration::minutes(1))
        }
        PostDelay::Normal {
            mean_minutes,
            std_dev_minutes,
            min_minutes,
            max_minutes,
        } => {
            let minutes = Normal::new(*mean_minutes, *std_dev_minutes)
                .map(|dist| dist.sample(rng))
                .unwrap_or(*mean_minutes)
                .clamp(*min_minutes as f64, *max_minutes as f64);
            chrono::Duration::seconds((minutes * 60.0).round() as i64)
        }
    }
}

pub struct PosterUnit {
    name: String,
    schedule: SchedulePolicy,
    generator: Arc<dyn ContentGenerator>,
    delivery: Arc<dyn DeliveryClient>,
    registry: ActionRegistry,
    /// Last text this unit published, fed back into the next prompt.
    previous_post: String,
    rng: StdRng,
}

impl PosterUnit {
    pub fn new(
        name: &str,
        schedule: SchedulePolicy,
        generator: Arc<dyn ContentGenerator>,
        delivery: Arc<dyn DeliveryClient>,
    ) -> Self {
        Self {
            name: name.to_string(),
            schedule,
            generator,
            delivery,
            registry: ActionRegistry::new(),
            previous_post: String::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic delay draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn previous_post(&self) -> &str {
        &self.previous_post
    }

    fn schedule_next(&mut self, now: DateTime<Utc>) {
        let delay = draw_post_delay(&self.schedule.post_delay, &mut self.rng);
        let action = ScheduledAction::post(now + delay);
        tracing::info!(
            "Core {} scheduled next post for {} (in {} min)",
            self.name,
            action.due_time.to_rfc3339(),
            delay.num_minutes()
        );
        self.registry.enqueue(action);
    }
}

#[async_trait]
impl CoreUnit for PosterUnit {
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
        tracing::info!(
            "Core {} ready, publishing through {}",
            self.name,
            self.delivery.name()
        );
        Ok(())
    }

    async fn tick(&mut self, now: DateTime<Utc>) -> Result<(), UnitError> {
        let policy = self.schedule.backoff.clone();
        let limit = self.schedule.external_call_timeout;

        if !self.registry.has_pending(&policy) {
            self.schedule_next(now);
        }

        let mut published: Option<String> = None;
        for action in self.registry.live_mut(&policy) {
            let previous = self.previous_post.as_str();
            let generator = &self.generator;
            match action
                .materialize_content(|| {
                    bounded(limit, generator.generate_post(previous), ContentError::Timeout)
                })
                .await
            {
                Ok(true) => tracing::info!("Core {} generated post {}", self.name, action.id),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Core {} failed to generate post: {}", self.name, e);
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
            let result = bounded(limit, self.delivery.post(&text), |timeout| {
                DeliveryError::Timeout { service, timeout }
            })
            .await;

            match result {
                Ok(id) => {
                    action.mark_sent();
                    tracing::info!("Core {} published post {}: {}", self.name, id, text);
                    published = Some(text);
                }
                Err(e) => {
                    action.record_failure(e.to_string(), &policy, now);
                    tracing::warn!(
                        "Core {} failed to publish post (attempt {}, retry at {}): {}",
                        self.name,
                        action.retry_count,
                        action.due_time.to_rfc3339(),
                        e
                    );
                }
            }
        }

        if let Some(text) = published {
            self.previous_post = text;
        }

        let report = self.registry.prune(&policy);
        log_abandoned(&self.name, &report);
        Ok(())
    }

    async fn shutdown(&mut self) {
        let dropped = self.registry.pending_count(&self.schedule.backoff);
        if dropped > 0 {
            tracing::info!("Core {} dropping {} pending post(s)", self.name, dropped);
        }
        self.registry.clear();
    }

    fn pending_actions(&self) -> usize {
        self.registry.pending_count(&self.schedule.backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use crate::agent::ActionState;
    use crate::units::fakes::{Outcome, ScriptedDelivery, ScriptedGenerator};

    fn poster(
        generator: Arc<ScriptedGenerator>,
        delivery: Arc<ScriptedDelivery>,
    ) -> PosterUnit {
        PosterUnit::new("poster", SchedulePolicy::production(), generator, delivery).with_seed(17)
    }

    fn only_action(unit: &PosterUnit) -> &ScheduledAction {
        let actions: Vec<_> = unit.registry().iter().collect();
        assert_eq!(actions.len(), 1);
        actions[0]
    }

    // ==================== Delay draws ====================

    #[test]
    fn test_normal_delay_is_clamped() {
        let delay = SchedulePolicy::production().post_delay;
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..1000 {
            let d = draw_post_delay(&delay, &mut rng);
            assert!(d >= chrono::Duration::minutes(5));
            assert!(d <= chrono::Duration::minutes(80));
        }
    }

    #[test]
    fn test_fixed_delay() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = draw_post_delay(&PostDelay::Fixed(Duration::from_secs(60)), &mut rng);
        assert_eq!(d, chrono::Duration::minutes(1));
    }

    // ==================== Scheduling ====================

    #[tokio::test]
    async fn test_first_tick_schedules_one_post() {
        let generator = Arc::new(ScriptedGenerator::new("hello world"));
        let delivery = Arc::new(ScriptedDelivery::new());
        let mut unit = poster(generator.clone(), delivery.clone());
        let now = Utc::now();

        unit.tick(now).await.unwrap();

        let action = only_action(&unit);
        assert!(action.due_time >= now + chrono::Duration::minutes(5));
        assert!(action.due_time <= now + chrono::Duration::minutes(80));
        assert_eq!(action.content.as_deref(), Some("hello world"));
        assert_eq!(delivery.attempt_count(), 0);
        assert_eq!(unit.pending_actions(), 1);
    }

    #[tokio::test]
    async fn test_content_generated_once_across_ticks() {
        let generator = Arc::new(ScriptedGenerator::new("once"));
        let delivery = Arc::new(ScriptedDelivery::new());
        let mut unit = poster(generator.clone(), delivery.clone());
        let now = Utc::now();

        for i in 0..10 {
            unit.tick(now + chrono::Duration::seconds(i)).await.unwrap();
        }

        assert_eq!(generator.post_calls.load(Ordering::SeqCst), 1);
        assert_eq!(unit.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_retries_without_backoff() {
        let generator = Arc::new(ScriptedGenerator::new("late").failing_first(3));
        let delivery = Arc::new(ScriptedDelivery::new());
        let mut unit = poster(generator.clone(), delivery.clone());
        let now = Utc::now();

        for i in 0..3 {
            unit.tick(now + chrono::Duration::seconds(i)).await.unwrap();
            let action = only_action(&unit);
            assert!(action.content.is_none());
            assert_eq!(action.retry_count, 0);
            assert_eq!(action.backoff_minutes, 0);
        }

        unit.tick(now + chrono::Duration::seconds(3)).await.unwrap();
        assert_eq!(only_action(&unit).content.as_deref(), Some("late"));
        assert_eq!(generator.post_calls.load(Ordering::SeqCst), 4);
    }

    // ==================== Delivery ====================

    #[tokio::test]
    async fn test_due_post_is_published_and_replaced() {
        let generator = Arc::new(ScriptedGenerator::new("gm"));
        let delivery = Arc::new(ScriptedDelivery::new());
        let mut unit = poster(generator.clone(), delivery.clone());
        let now = Utc::now();

        unit.tick(now).await.unwrap();
        let due = only_action(&unit).due_time;

        unit.tick(due).await.unwrap();
        assert_eq!(delivery.attempt_count(), 1);
        assert_eq!(unit.previous_post(), "gm");
        assert!(unit.registry().is_empty());

        unit.tick(due + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(unit.registry().len(), 1);
        assert_eq!(
            generator.previous_posts.lock().unwrap().last().map(String::as_str),
            Some("gm")
        );
    }

    #[tokio::test]
    async fn test_rate_limited_send_backs_off() {
        let generator = Arc::new(ScriptedGenerator::new("gm"));
        let delivery = Arc::new(ScriptedDelivery::with_outcomes(&[Outcome::RateLimited]));
        let mut unit = poster(generator, delivery.clone());
        let now = Utc::now();

        unit.tick(now).await.unwrap();
        let due = only_action(&unit).due_time;
        unit.tick(due).await.unwrap();

        let action = only_action(&unit);
        assert!(!action.completed);
        assert_eq!(action.retry_count, 1);
        assert_eq!(action.backoff_minutes, 5);
        assert_eq!(action.due_time, due + chrono::Duration::minutes(5));
        assert!(action.last_error.as_deref().unwrap().contains("Rate limited"));
    }

    #[tokio::test]
    async fn test_backoff_sequence_then_success() {
        let generator = Arc::new(ScriptedGenerator::new("gm"));
        let delivery = Arc::new(ScriptedDelivery::with_outcomes(&[
            Outcome::Failed,
            Outcome::RateLimited,
        ]));
        let mut unit = poster(generator, delivery.clone());
        let now = Utc::now();

        unit.tick(now).await.unwrap();
        let mut due = only_action(&unit).due_time;

        unit.tick(due).await.unwrap();
        assert_eq!(only_action(&unit).backoff_minutes, 5);
        due = only_action(&unit).due_time;

        unit.tick(due).await.unwrap();
        assert_eq!(only_action(&unit).backoff_minutes, 10);
        assert_eq!(only_action(&unit).retry_count, 2);
        due = only_action(&unit).due_time;

        unit.tick(due).await.unwrap();
        assert_eq!(delivery.delivered.lock().unwrap().len(), 1);
        assert!(unit.registry().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_post_is_abandoned() {
        let generator = Arc::new(ScriptedGenerator::new("gm"));
        let delivery = Arc::new(ScriptedDelivery::with_outcomes(&[
            Outcome::Failed,
            Outcome::Failed,
            Outcome::Failed,
        ]));
        let mut unit = poster(generator, delivery.clone());
        let now = Utc::now();

        unit.tick(now).await.unwrap();
        let mut due = only_action(&unit).due_time;
        for _ in 0..2 {
            unit.tick(due).await.unwrap();
            due = only_action(&unit).due_time;
        }
        let policy = SchedulePolicy::production().backoff;
        assert_eq!(only_action(&unit).state(&policy), ActionState::PendingSend);

        unit.tick(due).await.unwrap();
        assert_eq!(delivery.attempt_count(), 3);
        assert!(unit.registry().is_empty());
        assert!(delivery.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let generator = Arc::new(ScriptedGenerator::new("gm"));
        let delivery = Arc::new(ScriptedDelivery::new());
        let mut unit = poster(generator, delivery);
        unit.initialize().await.unwrap();
        unit.tick(Utc::now()).await.unwrap();

        unit.shutdown().await;
        unit.shutdown().await;
        assert_eq!(unit.pending_actions(), 0);
    }
}
