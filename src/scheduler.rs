//! Scheduling policy layered on top of the registry's storage primitives
//! (§4.2): retry/backoff classification, starvation relief, and cancellation
//! semantics all live here rather than in the registry itself, per the design
//! note that retry policy belongs to the scheduler alone.

use crate::models::{ErrorKind, TaskOutcome, TaskRecord, TaskStatus};
use crate::registry::Registry;
use crate::{HubConfig, HubError, Result};
use tracing::{info, warn};

#[derive(Clone)]
pub struct Scheduler {
    registry: Registry,
    max_attempts: u32,
    stale_pending_threshold: chrono::Duration,
}

/// Outcome of reporting a failed task attempt: either it went back to
/// `pending` for another try, or the attempt budget is exhausted and it is
/// now terminally `failed`.
pub enum RetryDecision {
    Requeued(TaskRecord),
    Failed(TaskRecord),
}

impl Scheduler {
    pub fn new(registry: Registry, config: &HubConfig) -> Self {
        Self {
            registry,
            max_attempts: config.max_attempts,
            stale_pending_threshold: chrono::Duration::seconds(
                config.stale_pending_threshold_secs as i64,
            ),
        }
    }

    pub async fn submit_task(&self, model: String, input: Vec<u8>, priority: i32) -> TaskRecord {
        self.registry.create_task(model, input, priority).await
    }

    pub async fn claim_next_task(&self, agent_id: &str) -> Result<Option<TaskRecord>> {
        self.registry.claim_next_pending_for_agent(agent_id).await
    }

    /// Cancel a task. Pending tasks are simply pulled off the queue;
    /// assigned/running tasks are marked cancelled synchronously — delivering
    /// the cancel signal to the owning agent is the caller's job (best-effort,
    /// asynchronous, per §5) via the notification layer.
    pub async fn cancel_task(&self, task_id: &str) -> Result<TaskRecord> {
        self.registry.cancel_task(task_id).await
    }

    /// Idempotent completion report.
    pub async fn report_completion(
        &self,
        task_id: &str,
        agent_id: &str,
        output: Vec<u8>,
        tokens_generated: Option<u64>,
        processing_time_ms: Option<u64>,
    ) -> Result<TaskRecord> {
        let outcome = TaskOutcome::Success {
            output,
            tokens_generated,
            processing_time_ms,
        };
        self.registry.complete_task(task_id, agent_id, outcome).await
    }

    /// Classify a reported failure and apply the retry policy: transient
    /// failures under the attempt budget go back to pending with the
    /// priority preserved and the attempt count incremented; everything else
    /// — permanent failures, or a transient failure that has exhausted
    /// `max_attempts` — becomes a terminal `failed` task. Rejects the report
    /// with `PermissionDenied` when `agent_id` is not the task's current
    /// owner, symmetric with `report_completion`'s ownership check.
    pub async fn report_failure(
        &self,
        task_id: &str,
        agent_id: &str,
        error_kind: String,
        message: String,
    ) -> Result<RetryDecision> {
        let task = self
            .registry
            .get_task(task_id)
            .await
            .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;

        if task.owner.as_deref() != Some(agent_id) {
            return Err(HubError::PermissionDenied(format!(
                "agent {agent_id} does not own task {task_id}"
            )));
        }

        let classification = ErrorKind::classify(&error_kind);
        let retryable = classification == ErrorKind::Transient && task.attempt_count + 1 < self.max_attempts;

        if retryable {
            let requeued = self.registry.requeue_task(task_id).await?;
            info!(task = %task_id, attempts = requeued.attempt_count, "task retried after transient failure");
            Ok(RetryDecision::Requeued(requeued))
        } else {
            let failed = self
                .registry
                .fail_task(task_id, task.status, error_kind, message)
                .await?;
            warn!(task = %task_id, "task failed terminally");
            Ok(RetryDecision::Failed(failed))
        }
    }

    /// Starvation relief sweep: decrement the priority of pending tasks that
    /// have aged past the stale-pending threshold so they eventually surface
    /// ahead of a steady stream of fresh high-priority submissions.
    pub async fn relieve_starvation(&self) -> Vec<String> {
        self.registry
            .tasks
            .bump_stale_pending(self.stale_pending_threshold)
            .await
    }

    /// Reclaim every actively-owned task of an agent the liveness monitor has
    /// just declared offline.
    pub async fn reclaim_orphans_for(&self, agent_id: &str) -> Vec<TaskRecord> {
        self.registry.reclaim_orphans_for(agent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_config() -> HubConfig {
        HubConfig::default()
    }

    #[tokio::test]
    async fn transient_failure_is_retried_until_attempt_budget() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let scheduler = Scheduler::new(registry, &test_config());

        let task = scheduler.submit_task("m".into(), vec![], 5).await;
        scheduler.claim_next_task("a1").await.unwrap();

        match scheduler
            .report_failure(&task.id, "a1", "timeout".into(), "slow".into())
            .await
            .unwrap()
        {
            RetryDecision::Requeued(t) => assert_eq!(t.attempt_count, 1),
            RetryDecision::Failed(_) => panic!("expected retry"),
        }
    }

    #[tokio::test]
    async fn permanent_failure_is_terminal_immediately() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let scheduler = Scheduler::new(registry, &test_config());

        let task = scheduler.submit_task("m".into(), vec![], 5).await;
        scheduler.claim_next_task("a1").await.unwrap();

        match scheduler
            .report_failure(&task.id, "a1", "invalid_argument".into(), "bad input".into())
            .await
            .unwrap()
        {
            RetryDecision::Failed(t) => assert_eq!(t.status, TaskStatus::Failed),
            RetryDecision::Requeued(_) => panic!("expected terminal failure"),
        }
    }

    #[tokio::test]
    async fn exhausted_attempt_budget_fails_instead_of_retrying() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let mut config = test_config();
        config.max_attempts = 1;
        let scheduler = Scheduler::new(registry, &config);

        let task = scheduler.submit_task("m".into(), vec![], 5).await;
        scheduler.claim_next_task("a1").await.unwrap();

        match scheduler
            .report_failure(&task.id, "a1", "timeout".into(), "slow".into())
            .await
            .unwrap()
        {
            RetryDecision::Failed(t) => assert_eq!(t.status, TaskStatus::Failed),
            RetryDecision::Requeued(_) => panic!("attempt budget should be exhausted"),
        }
    }

    #[tokio::test]
    async fn report_failure_from_non_owner_is_permission_denied() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        registry
            .register_agent("a2".into(), None, HashSet::new())
            .await
            .unwrap();
        let scheduler = Scheduler::new(registry, &test_config());

        let task = scheduler.submit_task("m".into(), vec![], 5).await;
        scheduler.claim_next_task("a1").await.unwrap();

        let result = scheduler
            .report_failure(&task.id, "a2", "timeout".into(), "slow".into())
            .await;
        assert!(matches!(result, Err(HubError::PermissionDenied(_))));
    }
}
