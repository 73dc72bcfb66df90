use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Minimum and maximum clamped priority values (§4.2 of the task model: lower
/// number = earlier service).
pub const PRIORITY_MIN: i32 = 0;
pub const PRIORITY_MAX: i32 = 9;
pub const DEFAULT_PRIORITY: i32 = 5;

/// Clamp a client-supplied priority into the valid range.
pub fn clamp_priority(priority: i32) -> i32 {
    priority.clamp(PRIORITY_MIN, PRIORITY_MAX)
}

/// Serde default for an omitted `priority` field on task-creation requests.
pub fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// Lifecycle status of an agent record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Registering,
    Online,
    Draining,
    Offline,
}

/// Optional network hint agents publish so the hub can push notifications
/// directly instead of falling back to the pending-notification queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkHint {
    pub host: String,
    pub port: u16,
}

/// An agent (worker node) known to the hub.
///
/// Created on first registration, mutated by heartbeats and task lifecycle
/// events, destroyed only by administrative action: offline agents are kept
/// around so their counters survive restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub hint: Option<NetworkHint>,
    pub status: AgentStatus,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
    pub current_load: f64,
    pub active_tasks: u32,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Declared supported model identifiers. Empty means "any" (universal capability).
    pub capabilities: HashSet<String>,
}

impl AgentRecord {
    pub fn new(id: String, hint: Option<NetworkHint>, capabilities: HashSet<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            hint,
            status: AgentStatus::Registering,
            last_heartbeat: now,
            current_load: 0.0,
            active_tasks: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            capabilities,
        }
    }

    /// Whether this agent can serve the given model: either it declared
    /// universal capability (empty set) or it lists the model explicitly.
    pub fn supports_model(&self, model: &str) -> bool {
        self.capabilities.is_empty() || self.capabilities.contains(model)
    }

    pub fn success_rate(&self) -> Option<f64> {
        let total = self.tasks_completed + self.tasks_failed;
        if total == 0 {
            None
        } else {
            Some(self.tasks_completed as f64 / total as f64)
        }
    }
}

/// Public projection of an agent record, returned by `GET /nodes/status`.
/// Never carries the network hint — that stays internal to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentView {
    pub id: String,
    pub status: AgentStatus,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub current_load: f64,
    pub active_tasks: u32,
}

impl From<&AgentRecord> for AgentView {
    fn from(agent: &AgentRecord) -> Self {
        Self {
            id: agent.id.clone(),
            status: agent.status,
            last_heartbeat: agent.last_heartbeat,
            tasks_completed: agent.tasks_completed,
            tasks_failed: agent.tasks_failed,
            current_load: agent.current_load,
            active_tasks: agent.active_tasks,
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are absorbing: no transition is permitted out of them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a task in this status counts against an agent's active-task tally.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::Running)
    }
}

/// Classification of a reported failure, used by the scheduler's retry policy.
/// `transient` failures (unavailable target, timeouts, resource exhaustion)
/// are retried up to `max_attempts`; `permanent` ones fail the task outright.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
}

impl ErrorKind {
    /// Classify a free-form error_kind string reported by an agent.
    pub fn classify(reported_kind: &str) -> Self {
        match reported_kind {
            "unavailable" | "timeout" | "resource_exhausted" => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }
}

/// Outcome payload recorded on a task, successful or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskOutcome {
    Success {
        output: Vec<u8>,
        tokens_generated: Option<u64>,
        processing_time_ms: Option<u64>,
    },
    Failure {
        error_kind: String,
        message: String,
    },
}

/// A unit of inference work. Created by clients, mutated only by the scheduler,
/// retained until a bounded retention window elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub model: String,
    pub input: Vec<u8>,
    pub priority: i32,
    pub status: TaskStatus,
    pub owner: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub assigned_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub attempt_count: u32,
    pub outcome: Option<TaskOutcome>,
}

impl TaskRecord {
    pub fn new(model: String, input: Vec<u8>, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model,
            input,
            priority: clamp_priority(priority),
            status: TaskStatus::Pending,
            owner: None,
            created_at: chrono::Utc::now(),
            assigned_at: None,
            completed_at: None,
            attempt_count: 0,
            outcome: None,
        }
    }
}

/// Read-model returned to clients for `GetTask`/`ListTasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub id: String,
    pub model: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub owner: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub assigned_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub attempt_count: u32,
    pub outcome: Option<TaskOutcome>,
}

impl From<&TaskRecord> for TaskView {
    fn from(task: &TaskRecord) -> Self {
        Self {
            id: task.id.clone(),
            model: task.model.clone(),
            priority: task.priority,
            status: task.status,
            owner: task.owner.clone(),
            created_at: task.created_at,
            assigned_at: task.assigned_at,
            completed_at: task.completed_at,
            attempt_count: task.attempt_count,
            outcome: task.outcome.clone(),
        }
    }
}

/// Outcome of a single handoff attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffOutcome {
    Pending,
    Completed,
    Failed,
}

/// Append-only handoff record, retained in a bounded ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub task_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub initiated_at: chrono::DateTime<chrono::Utc>,
    pub outcome: HandoffOutcome,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Rolled-up statistics exposed by the handoff evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffStats {
    pub total_handoffs: usize,
    pub successful_handoffs: usize,
    pub success_rate_percent: f64,
    pub active_handoffs: usize,
    pub handoffs_per_hour: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_priority_to_valid_range() {
        assert_eq!(clamp_priority(-5), 0);
        assert_eq!(clamp_priority(999), 9);
        assert_eq!(clamp_priority(5), 5);
    }

    #[test]
    fn universal_capability_supports_any_model() {
        let agent = AgentRecord::new("a1".into(), None, HashSet::new());
        assert!(agent.supports_model("m-small"));
        assert!(agent.supports_model("anything"));
    }

    #[test]
    fn declared_capability_is_exclusive() {
        let mut caps = HashSet::new();
        caps.insert("m-small".to_string());
        let agent = AgentRecord::new("a1".into(), None, caps);
        assert!(agent.supports_model("m-small"));
        assert!(!agent.supports_model("m-large"));
    }

    #[test]
    fn success_rate_is_none_with_no_history() {
        let agent = AgentRecord::new("a1".into(), None, HashSet::new());
        assert_eq!(agent.success_rate(), None);
    }

    #[test]
    fn terminal_states_are_absorbing() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
