//! The hub's single source of truth for agent and task state (§4.1).
//!
//! `Registry` composes [`agents::AgentStore`] and [`tasks::TaskStore`] as two
//! independently-locked collections, and is the only place that ever takes a
//! lock from both: every such operation acquires the agent lock before the
//! task lock, per the global ordering in §5.

pub mod agents;
pub mod tasks;

use crate::models::{
    AgentRecord, AgentStatus, AgentView, NetworkHint, TaskOutcome, TaskRecord, TaskStatus, TaskView,
};
use crate::{HubError, Result};
use agents::AgentStore;
use std::collections::HashSet;
use tasks::TaskStore;

#[derive(Clone)]
pub struct Registry {
    pub agents: AgentStore,
    pub tasks: TaskStore,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            agents: AgentStore::new(),
            tasks: TaskStore::new(),
        }
    }

    pub async fn register_agent(
        &self,
        id: String,
        hint: Option<NetworkHint>,
        capabilities: HashSet<String>,
    ) -> Result<AgentStatus> {
        self.agents.register(id, hint, capabilities).await
    }

    pub async fn record_heartbeat(
        &self,
        id: &str,
        load: Option<f64>,
        active_tasks: Option<u32>,
    ) -> Result<()> {
        self.agents.record_heartbeat(id, load, active_tasks).await
    }

    pub async fn get_agent(&self, id: &str) -> Option<AgentRecord> {
        self.agents.get(id).await
    }

    pub async fn list_agents(&self, status: Option<AgentStatus>) -> Vec<AgentView> {
        self.agents.list(status).await
    }

    pub async fn create_task(&self, model: String, input: Vec<u8>, priority: i32) -> TaskRecord {
        self.tasks.create_task(model, input, priority).await
    }

    pub async fn get_task(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.get(id).await
    }

    pub async fn list_tasks(&self, status: Option<TaskStatus>, limit: Option<usize>) -> Vec<TaskView> {
        self.tasks.list(status, limit).await
    }

    /// Atomic claim: verify the agent is online, pop the highest-priority
    /// pending task it is capable of serving, mark it assigned, and bump the
    /// agent's active-task tally. Returns `Ok(None)` on an empty match — not
    /// an error.
    pub async fn claim_next_pending_for_agent(&self, agent_id: &str) -> Result<Option<TaskRecord>> {
        let agent = self
            .agents
            .get(agent_id)
            .await
            .ok_or_else(|| HubError::NotFound(format!("agent {agent_id} not registered")))?;

        if agent.status != AgentStatus::Online {
            return Err(HubError::Unavailable(format!(
                "agent {agent_id} is not online"
            )));
        }

        let claimed = self
            .tasks
            .claim_first_matching(agent_id, |model| agent.supports_model(model))
            .await;

        if claimed.is_some() {
            self.agents.increment_active_tasks(agent_id, 1).await;
        }
        Ok(claimed)
    }

    pub async fn transition_task(
        &self,
        task_id: &str,
        expected: TaskStatus,
        new_status: TaskStatus,
        outcome: Option<TaskOutcome>,
    ) -> Result<TaskRecord> {
        self.tasks
            .transition(task_id, expected, new_status, outcome)
            .await
    }

    /// Report a successful completion. Idempotent on an identical repeat
    /// against an already-completed task; decrements the owning agent's
    /// active-task tally and bumps its success counter only on the
    /// transition that actually lands (not on the idempotent replay).
    pub async fn complete_task(
        &self,
        task_id: &str,
        agent_id: &str,
        outcome: TaskOutcome,
    ) -> Result<TaskRecord> {
        let before = self
            .tasks
            .get(task_id)
            .await
            .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;
        let was_already_terminal = before.status.is_terminal();

        let task = self.tasks.complete_idempotent(task_id, agent_id, outcome).await?;
        if !was_already_terminal {
            self.agents.record_completion(agent_id, true).await;
        }
        Ok(task)
    }

    /// Report a failure. Transient failures are returned to pending by the
    /// caller (scheduler); this just records the terminal `failed` state when
    /// the caller has decided the attempt budget is exhausted.
    pub async fn fail_task(
        &self,
        task_id: &str,
        expected: TaskStatus,
        error_kind: String,
        message: String,
    ) -> Result<TaskRecord> {
        let agent_id = self
            .tasks
            .get(task_id)
            .await
            .and_then(|t| t.owner.clone());

        let outcome = TaskOutcome::Failure { error_kind, message };
        let task = self
            .tasks
            .transition(task_id, expected, TaskStatus::Failed, Some(outcome))
            .await?;

        if let Some(agent_id) = agent_id {
            self.agents.record_completion(&agent_id, false).await;
        }
        Ok(task)
    }

    /// Return a task to pending. Decrements the previous owner's active-task
    /// tally exactly like `reassign_task` does — a requeue is half of a
    /// reassignment, the other half being "no new owner yet".
    pub async fn requeue_task(&self, task_id: &str) -> Result<TaskRecord> {
        let previous_owner = self.tasks.get(task_id).await.and_then(|t| t.owner);
        let requeued = self.tasks.requeue(task_id).await?;
        if let Some(owner) = previous_owner {
            self.agents.increment_active_tasks(&owner, -1).await;
        }
        Ok(requeued)
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<TaskRecord> {
        let previous_owner = self.tasks.get(task_id).await.and_then(|t| t.owner);
        let cancelled = self.tasks.cancel(task_id).await?;
        if let Some(owner) = previous_owner {
            self.agents.increment_active_tasks(&owner, -1).await;
        }
        Ok(cancelled)
    }

    /// Atomically move task ownership from one agent to another, used by the
    /// handoff evaluator. Lock order: agent store is read (capability check
    /// happens in the caller before this is invoked), then the task lock.
    pub async fn reassign_task(&self, task_id: &str, from: &str, to: &str) -> Result<TaskRecord> {
        let task = self.tasks.reassign(task_id, from, to).await?;
        self.agents.increment_active_tasks(from, -1).await;
        self.agents.increment_active_tasks(to, 1).await;
        Ok(task)
    }

    /// Demote an agent to offline and reclaim every task it was actively
    /// running as orphaned (back to pending, attempt count incremented, no
    /// result preserved). Invoked by the liveness monitor.
    pub async fn reclaim_orphans_for(&self, agent_id: &str) -> Vec<TaskRecord> {
        if !self.agents.mark_offline(agent_id).await {
            return Vec::new();
        }

        let mut reclaimed = Vec::new();
        for task_id in self.tasks.running_ids().await {
            if let Some(task) = self.tasks.get(&task_id).await {
                if task.owner.as_deref() == Some(agent_id) {
                    if let Ok(requeued) = self.tasks.requeue(&task_id).await {
                        self.agents.increment_active_tasks(agent_id, -1).await;
                        reclaimed.push(requeued);
                    }
                }
            }
        }
        reclaimed
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_is_empty_not_error_when_no_match() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let claimed = registry.claim_next_pending_for_agent("a1").await.unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn claim_fails_for_offline_agent() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        registry.reclaim_orphans_for("a1").await;

        let result = registry.claim_next_pending_for_agent("a1").await;
        assert!(matches!(result, Err(HubError::Unavailable(_))));
    }

    #[tokio::test]
    async fn orphan_reclamation_returns_running_task_to_pending() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let task = registry.create_task("m".into(), vec![], 5).await;
        registry.claim_next_pending_for_agent("a1").await.unwrap();
        registry
            .transition_task(&task.id, TaskStatus::Assigned, TaskStatus::Running, None)
            .await
            .unwrap();

        let reclaimed = registry.reclaim_orphans_for("a1").await;
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].status, TaskStatus::Pending);
        assert_eq!(reclaimed[0].attempt_count, 1);
        assert_eq!(registry.get_agent("a1").await.unwrap().active_tasks, 0);
    }

    #[tokio::test]
    async fn requeue_decrements_previous_owner_active_tasks() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let task = registry.create_task("m".into(), vec![], 5).await;
        registry.claim_next_pending_for_agent("a1").await.unwrap();
        assert_eq!(registry.get_agent("a1").await.unwrap().active_tasks, 1);

        registry.requeue_task(&task.id).await.unwrap();
        assert_eq!(registry.get_agent("a1").await.unwrap().active_tasks, 0);
    }

    #[tokio::test]
    async fn cancel_running_task_decrements_owner_active_tasks() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let task = registry.create_task("m".into(), vec![], 5).await;
        registry.claim_next_pending_for_agent("a1").await.unwrap();
        assert_eq!(registry.get_agent("a1").await.unwrap().active_tasks, 1);

        registry.cancel_task(&task.id).await.unwrap();
        assert_eq!(registry.get_agent("a1").await.unwrap().active_tasks, 0);
    }

    #[tokio::test]
    async fn cancel_pending_task_does_not_touch_active_tasks() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let task = registry.create_task("m".into(), vec![], 5).await;

        registry.cancel_task(&task.id).await.unwrap();
        assert_eq!(registry.get_agent("a1").await.unwrap().active_tasks, 0);
    }

    #[tokio::test]
    async fn reassign_moves_active_task_counts() {
        let registry = Registry::new();
        registry
            .register_agent("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        registry
            .register_agent("a2".into(), None, HashSet::new())
            .await
            .unwrap();
        let task = registry.create_task("m".into(), vec![], 5).await;
        registry.claim_next_pending_for_agent("a1").await.unwrap();

        registry.reassign_task(&task.id, "a1", "a2").await.unwrap();
        let moved = registry.get_task(&task.id).await.unwrap();
        assert_eq!(moved.owner.as_deref(), Some("a2"));
        assert_eq!(registry.get_agent("a1").await.unwrap().active_tasks, 0);
        assert_eq!(registry.get_agent("a2").await.unwrap().active_tasks, 1);
    }
}
