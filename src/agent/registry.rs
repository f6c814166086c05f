//! Per-unit list of scheduled actions.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::agent::action::ScheduledAction;
use crate::agent::backoff::BackoffPolicy;

/// Outcome of a prune pass.
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub sent: usize,
    pub abandoned: Vec<ScheduledAction>,
}

/// Ordered collection of a unit's actions. Insertion order is kept.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: Vec<ScheduledAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action and return its id.
    pub fn enqueue(&mut self, action: ScheduledAction) -> Uuid {
        let id = action.id;
        self.actions.push(action);
        id
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledAction> {
        self.actions.iter()
    }

    /// Mutable access to actions that have not been delivered or abandoned.
    pub fn live_mut<'a>(
        &'a mut self,
        policy: &'a BackoffPolicy,
    ) -> impl Iterator<Item = &'a mut ScheduledAction> + 'a {
        self.actions.iter_mut().filter(move |a| a.is_live(policy))
    }

    pub fn get(&self, id: Uuid) -> Option<&ScheduledAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Number of actions still waiting to be delivered.
    pub fn pending_count(&self, policy: &BackoffPolicy) -> usize {
        self.actions.iter().filter(|a| a.is_live(policy)).count()
    }

    pub fn has_pending(&self, policy: &BackoffPolicy) -> bool {
        self.actions.iter().any(|a| a.is_live(policy))
    }

    /// Latest due time among live actions.
    pub fn latest_due_time(&self, policy: &BackoffPolicy) -> Option<DateTime<Utc>> {
        self.actions
            .iter()
            .filter(|a| a.is_live(policy))
            .map(|a| a.due_time)
            .max()
    }

    /// Drop delivered and exhausted actions.
    pub fn prune(&mut self, policy: &BackoffPolicy) -> PruneReport {
        let mut report = PruneReport::default();
        let mut kept = Vec::with_capacity(self.actions.len());
        for action in self.actions.drain(..) {
            if action.completed {
                report.sent += 1;
            } else if policy.is_exhausted(action.retry_count) {
                report.abandoned.push(action);
            } else {
                kept.push(action);
            }
        }
        self.actions = kept;
        report
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_enqueue_and_lookup() {
        let mut registry = ActionRegistry::new();
        assert!(registry.is_empty());

        let id = registry.enqueue(ScheduledAction::post(Utc::now()));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_some());
        assert!(registry.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_latest_due_time_ignores_finished() {
        let policy = BackoffPolicy::default();
        let now = Utc::now();
        let mut registry = ActionRegistry::new();
        assert!(registry.latest_due_time(&policy).is_none());

        registry.enqueue(ScheduledAction::post(now + ChronoDuration::minutes(1)));
        let mut done = ScheduledAction::post(now + ChronoDuration::minutes(30));
        done.mark_sent();
        registry.enqueue(done);

        assert_eq!(
            registry.latest_due_time(&policy),
            Some(now + ChronoDuration::minutes(1))
        );
    }

    #[test]
    fn test_prune_removes_sent_and_abandoned() {
        let policy = BackoffPolicy::default();
        let now = Utc::now();
        let mut registry = ActionRegistry::new();

        let mut sent = ScheduledAction::post(now);
        sent.mark_sent();
        registry.enqueue(sent);

        let mut exhausted = ScheduledAction::post(now);
        for _ in 0..3 {
            exhausted.record_failure("HTTP 503", &policy, now);
        }
        let exhausted_id = registry.enqueue(exhausted);

        let pending_id = registry.enqueue(ScheduledAction::post(now));

        assert_eq!(registry.pending_count(&policy), 1);
        let report = registry.prune(&policy);
        assert_eq!(report.sent, 1);
        assert_eq!(report.abandoned.len(), 1);
        assert_eq!(report.abandoned[0].id, exhausted_id);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(pending_id).is_some());
    }

    #[test]
    fn test_live_mut_skips_finished() {
        let policy = BackoffPolicy::default();
        let now = Utc::now();
        let mut registry = ActionRegistry::new();

        let mut sent = ScheduledAction::post(now);
        sent.mark_sent();
        registry.enqueue(sent);
        registry.enqueue(ScheduledAction::post(now));

        let live: Vec<_> = registry.live_mut(&policy).collect();
        assert_eq!(live.len(), 1);
        assert!(!live[0].completed);
    }
}
