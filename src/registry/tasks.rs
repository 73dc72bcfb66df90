use crate::models::{clamp_priority, TaskOutcome, TaskRecord, TaskStatus, TaskView};
use crate::{HubError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

struct TaskInner {
    tasks: HashMap<String, TaskRecord>,
    /// Pending queue: task ids ordered by (priority ascending, creation time
    /// ascending), tie-broken by id. Invariant (§3): every id here names a
    /// task whose status is `pending`, and every pending task appears here
    /// exactly once.
    pending: VecDeque<String>,
}

/// Task record storage plus the pending queue it owns. Combines what the
/// teacher splits across `TaskQueue` (ordering) and `ResultStore`/
/// `AtomicTaskStateManager` (storage + compare-and-transition), because §4.1
/// specifies both as one component's responsibility.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Mutex<TaskInner>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TaskInner {
                tasks: HashMap::new(),
                pending: VecDeque::new(),
            })),
        }
    }

    /// Insert a pending task in priority order and return its record.
    pub async fn create_task(&self, model: String, input: Vec<u8>, priority: i32) -> TaskRecord {
        let task = TaskRecord::new(model, input, clamp_priority(priority));
        let mut inner = self.inner.lock().await;
        insert_sorted(&mut inner.pending, &inner.tasks, &task);
        let task_id = task.id.clone();
        inner.tasks.insert(task_id.clone(), task.clone());
        info!(task = %task_id, priority = task.priority, "task created");
        task
    }

    pub async fn get(&self, id: &str) -> Option<TaskRecord> {
        self.inner.lock().await.tasks.get(id).cloned()
    }

    pub async fn get_view(&self, id: &str) -> Option<TaskView> {
        self.inner.lock().await.tasks.get(id).map(TaskView::from)
    }

    pub async fn list(&self, status: Option<TaskStatus>, limit: Option<usize>) -> Vec<TaskView> {
        let inner = self.inner.lock().await;
        let mut views: Vec<TaskView> = inner
            .tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .map(TaskView::from)
            .collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            views.truncate(limit);
        }
        views
    }

    pub async fn pending_ids(&self) -> Vec<String> {
        self.inner.lock().await.pending.iter().cloned().collect()
    }

    pub async fn running_ids(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .values()
            .filter(|t| t.status.is_active())
            .map(|t| t.id.clone())
            .collect()
    }

    /// Pop the first pending task whose model the caller accepts (`predicate`
    /// returns true), atomically moving it to `assigned` and setting its owner.
    /// Returns `None` when no pending task currently matches — an empty
    /// result, not an error (§8 boundary behavior).
    pub async fn claim_first_matching<F>(&self, owner: &str, predicate: F) -> Option<TaskRecord>
    where
        F: Fn(&str) -> bool,
    {
        let mut inner = self.inner.lock().await;
        let position = inner
            .pending
            .iter()
            .position(|id| predicate(&inner.tasks[id].model))?;
        let task_id = inner.pending.remove(position)?;

        let task = inner.tasks.get_mut(&task_id)?;
        task.status = TaskStatus::Assigned;
        task.owner = Some(owner.to_string());
        task.assigned_at = Some(chrono::Utc::now());
        debug!(task = %task_id, agent = %owner, "task claimed");
        Some(task.clone())
    }

    /// Compare-and-set transition: only succeeds if the task's current status
    /// equals `expected`. Terminal states are absorbing — attempting to leave
    /// one always yields `StateConflict`.
    pub async fn transition(
        &self,
        task_id: &str,
        expected: TaskStatus,
        new_status: TaskStatus,
        outcome: Option<TaskOutcome>,
    ) -> Result<TaskRecord> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;

        if task.status.is_terminal() || task.status != expected {
            return Err(HubError::StateConflict(format!(
                "task {task_id} is {:?}, expected {:?}",
                task.status, expected
            )));
        }

        task.status = new_status;
        if new_status.is_terminal() {
            task.completed_at = Some(chrono::Utc::now());
        }
        if let Some(outcome) = outcome {
            task.outcome = Some(outcome);
        }
        if !new_status.is_active() {
            task.owner = None;
        }
        debug!(task = %task_id, ?new_status, "task transitioned");
        Ok(task.clone())
    }

    /// Idempotent completion: a second call reporting an identical result
    /// against an already-completed task succeeds silently (§8 round-trip
    /// law); a differing result is a `StateConflict`.
    pub async fn complete_idempotent(
        &self,
        task_id: &str,
        owner: &str,
        outcome: TaskOutcome,
    ) -> Result<TaskRecord> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;

        if task.status == TaskStatus::Completed {
            if outcomes_match(&task.outcome, &outcome) {
                return Ok(task.clone());
            }
            return Err(HubError::StateConflict(format!(
                "task {task_id} already completed with a different result"
            )));
        }

        if task.status.is_terminal() || task.status != TaskStatus::Running {
            return Err(HubError::StateConflict(format!(
                "task {task_id} is {:?}, cannot complete",
                task.status
            )));
        }

        if task.owner.as_deref() != Some(owner) {
            return Err(HubError::PermissionDenied(format!(
                "agent {owner} does not own task {task_id}"
            )));
        }

        task.status = TaskStatus::Completed;
        task.completed_at = Some(chrono::Utc::now());
        task.outcome = Some(outcome);
        task.owner = Some(owner.to_string());
        Ok(task.clone())
    }

    /// Atomic owner move used by the handoff evaluator: requires the task to
    /// currently be owned by `from` and active.
    pub async fn reassign(&self, task_id: &str, from: &str, to: &str) -> Result<TaskRecord> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;

        if task.owner.as_deref() != Some(from) || !task.status.is_active() {
            return Err(HubError::StateConflict(format!(
                "task {task_id} is not actively owned by {from}"
            )));
        }
        task.owner = Some(to.to_string());
        Ok(task.clone())
    }

    /// Return a task to `pending`, incrementing its attempt count, preserving
    /// priority. Used by retry and orphan reclamation.
    pub async fn requeue(&self, task_id: &str) -> Result<TaskRecord> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;

        task.status = TaskStatus::Pending;
        task.owner = None;
        task.assigned_at = None;
        task.attempt_count += 1;
        let snapshot = task.clone();

        insert_sorted(&mut inner.pending, &inner.tasks, &snapshot);
        debug!(task = %task_id, attempts = snapshot.attempt_count, "task requeued");
        Ok(snapshot)
    }

    /// Cancel a task: from `pending` it is pulled off the queue; from
    /// `assigned`/`running` it is simply marked cancelled (the owning agent
    /// learns asynchronously). Terminal tasks cannot be cancelled.
    pub async fn cancel(&self, task_id: &str) -> Result<TaskRecord> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;

        if task.status.is_terminal() {
            return Err(HubError::StateConflict(format!(
                "task {task_id} is already terminal"
            )));
        }

        let was_pending = task.status == TaskStatus::Pending;
        task.status = TaskStatus::Cancelled;
        task.owner = None;
        task.completed_at = Some(chrono::Utc::now());
        let snapshot = task.clone();

        if was_pending {
            inner.pending.retain(|id| id != task_id);
        }
        info!(task = %task_id, "task cancelled");
        Ok(snapshot)
    }

    /// Decrement the effective priority of any pending task older than
    /// `threshold`, without reordering ties unfairly (re-sorts the queue
    /// after mutation). Used by the scheduler's starvation-relief sweep.
    pub async fn bump_stale_pending(&self, threshold: chrono::Duration) -> Vec<String> {
        let mut inner = self.inner.lock().await;
        let now = chrono::Utc::now();
        let mut bumped = Vec::new();
        for id in inner.pending.clone() {
            if let Some(task) = inner.tasks.get_mut(&id) {
                if task.priority > crate::models::PRIORITY_MIN && now - task.created_at > threshold
                {
                    task.priority -= 1;
                    bumped.push(id);
                }
            }
        }
        if !bumped.is_empty() {
            let tasks = inner.tasks.clone();
            let mut ordered: Vec<String> = inner.pending.iter().cloned().collect();
            ordered.sort_by(|a, b| compare_pending(&tasks[a], &tasks[b]));
            inner.pending = ordered.into();
        }
        bumped
    }

    /// Retain only terminal tasks completed within the retention window (plus
    /// every still-active/pending task, which is never GC'd by age alone).
    pub async fn prune_terminal_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.tasks.len();
        inner.tasks.retain(|_, task| {
            !task.status.is_terminal() || task.completed_at.is_none_or(|at| at > cutoff)
        });
        before - inner.tasks.len()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn outcomes_match(existing: &Option<TaskOutcome>, incoming: &TaskOutcome) -> bool {
    match (existing, incoming) {
        (
            Some(TaskOutcome::Success { output: a, .. }),
            TaskOutcome::Success { output: b, .. },
        ) => a == b,
        (
            Some(TaskOutcome::Failure {
                error_kind: ak,
                message: am,
            }),
            TaskOutcome::Failure {
                error_kind: bk,
                message: bm,
            },
        ) => ak == bk && am == bm,
        _ => false,
    }
}

fn compare_pending(a: &TaskRecord, b: &TaskRecord) -> std::cmp::Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

fn insert_sorted(
    pending: &mut VecDeque<String>,
    tasks: &HashMap<String, TaskRecord>,
    task: &TaskRecord,
) {
    let position = pending
        .iter()
        .position(|id| compare_pending(task, &tasks[id]) == std::cmp::Ordering::Less)
        .unwrap_or(pending.len());
    pending.insert(position, task.id.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn priority_ordering_is_stable() {
        let store = TaskStore::new();
        let t1 = store.create_task("m".into(), vec![], 5).await;
        let t2 = store.create_task("m".into(), vec![], 1).await;
        let t3 = store.create_task("m".into(), vec![], 5).await;

        let order = store.pending_ids().await;
        assert_eq!(order, vec![t2.id, t1.id, t3.id]);
    }

    #[tokio::test]
    async fn claim_returns_none_on_empty_queue() {
        let store = TaskStore::new();
        assert!(store.claim_first_matching("a1", |_| true).await.is_none());
    }

    #[tokio::test]
    async fn claim_respects_capability_predicate() {
        let store = TaskStore::new();
        let small = store.create_task("m-small".into(), vec![], 5).await;
        let _large = store.create_task("m-large".into(), vec![], 5).await;

        let claimed = store
            .claim_first_matching("a1", |m| m == "m-small")
            .await
            .unwrap();
        assert_eq!(claimed.id, small.id);
        assert_eq!(claimed.status, TaskStatus::Assigned);
    }

    #[tokio::test]
    async fn terminal_transitions_are_rejected() {
        let store = TaskStore::new();
        let task = store.create_task("m".into(), vec![], 5).await;
        store
            .transition(&task.id, TaskStatus::Pending, TaskStatus::Cancelled, None)
            .await
            .unwrap();

        let result = store
            .transition(&task.id, TaskStatus::Cancelled, TaskStatus::Running, None)
            .await;
        assert!(matches!(result, Err(HubError::StateConflict(_))));
    }

    #[tokio::test]
    async fn duplicate_completion_is_idempotent() {
        let store = TaskStore::new();
        let task = store.create_task("m".into(), vec![], 5).await;
        store
            .claim_first_matching("a1", |_| true)
            .await
            .unwrap();
        store
            .transition(&task.id, TaskStatus::Assigned, TaskStatus::Running, None)
            .await
            .unwrap();

        let outcome = TaskOutcome::Success {
            output: b"x".to_vec(),
            tokens_generated: None,
            processing_time_ms: None,
        };
        store
            .complete_idempotent(&task.id, "a1", outcome.clone())
            .await
            .unwrap();
        store
            .complete_idempotent(&task.id, "a1", outcome)
            .await
            .unwrap();

        let conflicting = TaskOutcome::Success {
            output: b"y".to_vec(),
            tokens_generated: None,
            processing_time_ms: None,
        };
        let result = store.complete_idempotent(&task.id, "a1", conflicting).await;
        assert!(matches!(result, Err(HubError::StateConflict(_))));
    }

    #[tokio::test]
    async fn cancel_pending_removes_from_queue() {
        let store = TaskStore::new();
        let task = store.create_task("m".into(), vec![], 5).await;
        store.cancel(&task.id).await.unwrap();
        assert!(store.pending_ids().await.is_empty());
        assert_eq!(store.get(&task.id).await.unwrap().status, TaskStatus::Cancelled);
    }
}
