//! The explicit composition root (§9's design note): replaces the teacher's
//! module-level singletons with a plain struct of collaborators that tests
//! construct fresh per case. `AppContext` carries no background loops of its
//! own — those are spawned by `main` against the pieces it exposes — and
//! implements the logical Dispatch API operations of §4.3 directly.

use crate::handoff::{HandoffCandidate, HandoffEvaluator};
use crate::liveness::LivenessMonitor;
use crate::models::{
    AgentStatus, AgentView, HandoffRecord, HandoffStats, NetworkHint, TaskRecord, TaskStatus, TaskView,
};
use crate::notify::NotificationHub;
use crate::registry::Registry;
use crate::scheduler::{RetryDecision, Scheduler};
use crate::{HubConfig, Result};
use std::collections::HashSet;

#[derive(Clone)]
pub struct AppContext {
    pub registry: Registry,
    pub scheduler: Scheduler,
    pub handoff: HandoffEvaluator,
    pub notifications: NotificationHub,
    pub config: HubConfig,
}

impl AppContext {
    pub fn new(config: HubConfig) -> Self {
        let registry = Registry::new();
        let scheduler = Scheduler::new(registry.clone(), &config);
        let notifications = NotificationHub::new(
            config.notification_queue_capacity,
            config.notification_ttl_secs,
            config.push_deadline_secs,
        );
        let handoff = HandoffEvaluator::new(
            registry.clone(),
            notifications.clone(),
            config.handoff_ring_capacity,
        );
        Self {
            registry,
            scheduler,
            handoff,
            notifications,
            config,
        }
    }

    /// Build the liveness monitor. Kept separate from `new` since its `run`
    /// loop is spawned by the caller, not owned by `AppContext`.
    pub fn liveness_monitor(&self) -> LivenessMonitor {
        LivenessMonitor::new(
            self.registry.clone(),
            self.scheduler.clone(),
            self.notifications.clone(),
            self.config.sweep_period_secs,
            self.config.offline_threshold_secs,
        )
    }

    pub async fn register_agent(
        &self,
        id: String,
        hint: Option<NetworkHint>,
        capabilities: HashSet<String>,
    ) -> Result<AgentStatus> {
        self.registry.register_agent(id, hint, capabilities).await
    }

    pub async fn heartbeat(
        &self,
        agent_id: &str,
        load: Option<f64>,
        active_tasks: Option<u32>,
    ) -> Result<Vec<crate::notify::HandoffNotification>> {
        self.registry.record_heartbeat(agent_id, load, active_tasks).await?;
        Ok(self.notifications.drain(agent_id).await)
    }

    pub async fn list_agents(&self, status: Option<AgentStatus>) -> Vec<AgentView> {
        self.registry.list_agents(status).await
    }

    pub async fn submit_task(&self, model: String, input: Vec<u8>, priority: i32) -> TaskRecord {
        self.scheduler.submit_task(model, input, priority).await
    }

    pub async fn submit_batch(
        &self,
        tasks: Vec<(String, Vec<u8>, i32)>,
    ) -> Vec<TaskRecord> {
        let mut created = Vec::with_capacity(tasks.len());
        for (model, input, priority) in tasks {
            created.push(self.submit_task(model, input, priority).await);
        }
        created
    }

    pub async fn get_task(&self, task_id: &str) -> Option<TaskRecord> {
        self.registry.get_task(task_id).await
    }

    pub async fn list_tasks(&self, status: Option<TaskStatus>, limit: Option<usize>) -> Vec<TaskView> {
        self.registry.list_tasks(status, limit).await
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<TaskRecord> {
        self.scheduler.cancel_task(task_id).await
    }

    pub async fn claim_next_task(&self, agent_id: &str) -> Result<Option<TaskRecord>> {
        self.scheduler.claim_next_task(agent_id).await
    }

    pub async fn report_completion(
        &self,
        task_id: &str,
        agent_id: &str,
        output: Vec<u8>,
        tokens_generated: Option<u64>,
        processing_time_ms: Option<u64>,
    ) -> Result<TaskRecord> {
        self.scheduler
            .report_completion(task_id, agent_id, output, tokens_generated, processing_time_ms)
            .await
    }

    pub async fn report_failure(
        &self,
        task_id: &str,
        agent_id: &str,
        error_kind: String,
        message: String,
    ) -> Result<RetryDecision> {
        self.scheduler
            .report_failure(task_id, agent_id, error_kind, message)
            .await
    }

    pub async fn evaluate_handoff(
        &self,
        task_id: &str,
        current_agent_id: &str,
    ) -> Result<Option<HandoffCandidate>> {
        self.handoff.evaluate(task_id, current_agent_id).await
    }

    pub async fn execute_handoff(
        &self,
        task_id: &str,
        from_agent: &str,
        to_agent: &str,
    ) -> Result<HandoffRecord> {
        self.handoff.execute(task_id, from_agent, to_agent).await
    }

    pub async fn handoff_stats(&self) -> HandoffStats {
        self.handoff.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn happy_path_submit_claim_complete() {
        let ctx = AppContext::new(HubConfig::default());
        ctx.register_agent("a1".into(), None, HashSet::new()).await.unwrap();

        let task = ctx.submit_task("m".into(), vec![1, 2, 3], 5).await;
        let claimed = ctx.claim_next_task("a1").await.unwrap().unwrap();
        assert_eq!(claimed.id, task.id);

        ctx.registry
            .transition_task(&task.id, TaskStatus::Assigned, TaskStatus::Running, None)
            .await
            .unwrap();
        let completed = ctx
            .report_completion(&task.id, "a1", b"done".to_vec(), Some(10), Some(5))
            .await
            .unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);

        let fetched = ctx.get_task(&task.id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn priority_ordering_serves_lower_number_first() {
        let ctx = AppContext::new(HubConfig::default());
        ctx.register_agent("a1".into(), None, HashSet::new()).await.unwrap();

        let low_priority = ctx.submit_task("m".into(), vec![], 9).await;
        let high_priority = ctx.submit_task("m".into(), vec![], 0).await;

        let claimed = ctx.claim_next_task("a1").await.unwrap().unwrap();
        assert_eq!(claimed.id, high_priority.id);
        assert_ne!(claimed.id, low_priority.id);
    }
}
