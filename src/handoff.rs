//! Peer-to-peer handoff evaluation (§4.5): recommend-only candidate scoring
//! plus atomic execution that reassigns ownership through the registry and
//! delivers a best-effort notification.
//!
//! Ported from the original handoff manager's `_score_candidates` /
//! `evaluate_handoff_candidate` / `initiate_handoff`, with one deliberate fix:
//! the original removed its in-flight handoff record in a `finally` block,
//! which ran *after* the history append but could interleave with a
//! concurrent read of `active_handoffs` mid-append. Here the active record is
//! removed only once the history write has completed, on every exit path,
//! by explicit sequencing rather than a deferred block.

use crate::constants::{
    HANDOFF_CAPABILITY_BONUS, HANDOFF_CAPACITY_CEILING, HANDOFF_CAPACITY_WEIGHT,
    HANDOFF_ELIGIBLE_ACTIVE_TASKS_CEILING, HANDOFF_ELIGIBLE_LOAD_CEILING, HANDOFF_LOAD_WEIGHT,
    HANDOFF_RECOMMEND_THRESHOLD, HANDOFF_RELIABILITY_WEIGHT,
};
use crate::models::{AgentRecord, AgentStatus, HandoffOutcome, HandoffRecord, HandoffStats};
use crate::notify::{HandoffNotification, NotificationHub};
use crate::registry::Registry;
use crate::{HubError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// A scored handoff candidate. `total_score` is exposed so callers (and
/// tests) can observe the exact recommendation arithmetic from §8's scenarios.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HandoffCandidate {
    pub agent_id: String,
    pub total_score: f64,
}

#[derive(Clone)]
pub struct HandoffEvaluator {
    registry: Registry,
    notifications: NotificationHub,
    history: Arc<Mutex<VecDeque<HandoffRecord>>>,
    active: Arc<Mutex<HashMap<String, HandoffRecord>>>,
    ring_capacity: usize,
}

impl HandoffEvaluator {
    pub fn new(registry: Registry, notifications: NotificationHub, ring_capacity: usize) -> Self {
        Self {
            registry,
            notifications,
            history: Arc::new(Mutex::new(VecDeque::new())),
            active: Arc::new(Mutex::new(HashMap::new())),
            ring_capacity,
        }
    }

    fn is_eligible(candidate: &AgentRecord, current_agent_id: &str) -> bool {
        candidate.id != current_agent_id
            && candidate.status == AgentStatus::Online
            && candidate.current_load < HANDOFF_ELIGIBLE_LOAD_CEILING
            && candidate.active_tasks < HANDOFF_ELIGIBLE_ACTIVE_TASKS_CEILING
    }

    fn score(candidate: &AgentRecord, model: &str) -> f64 {
        let load_score = (1.0 - candidate.current_load) * HANDOFF_LOAD_WEIGHT;
        let capacity_score = (HANDOFF_CAPACITY_CEILING - candidate.active_tasks as i64)
            .max(0) as f64
            * HANDOFF_CAPACITY_WEIGHT;
        let reliability_score = candidate
            .success_rate()
            .map(|rate| rate * HANDOFF_RELIABILITY_WEIGHT)
            .unwrap_or(0.0);
        let capability_score = if candidate.supports_model(model) {
            HANDOFF_CAPABILITY_BONUS
        } else {
            0.0
        };
        load_score + capacity_score + reliability_score + capability_score
    }

    /// Recommend the best candidate to take over `task_id` from
    /// `current_agent_id`, if any candidate clears the recommendation
    /// threshold. Pure evaluation — never mutates state.
    pub async fn evaluate(
        &self,
        task_id: &str,
        current_agent_id: &str,
    ) -> Result<Option<HandoffCandidate>> {
        let task = self
            .registry
            .get_task(task_id)
            .await
            .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;

        let mut best: Option<HandoffCandidate> = None;
        for candidate in self.registry.agents.list_records().await {
            if !Self::is_eligible(&candidate, current_agent_id) {
                continue;
            }
            let total_score = Self::score(&candidate, &task.model);
            if total_score <= HANDOFF_RECOMMEND_THRESHOLD {
                continue;
            }
            if best.as_ref().is_none_or(|b| total_score > b.total_score) {
                best = Some(HandoffCandidate {
                    agent_id: candidate.id.clone(),
                    total_score,
                });
            }
        }
        Ok(best)
    }

    /// Execute a handoff: atomically reassign ownership through the registry,
    /// append the outcome to the bounded history ring, and only then drop the
    /// in-flight record. Notification delivery is best-effort and does not
    /// affect the recorded outcome — success here means the registry reflects
    /// the new owner, not that the agent has begun executing.
    pub async fn execute(
        &self,
        task_id: &str,
        from_agent: &str,
        to_agent: &str,
    ) -> Result<HandoffRecord> {
        let initiated_at = chrono::Utc::now();
        let in_flight = HandoffRecord {
            task_id: task_id.to_string(),
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            initiated_at,
            outcome: HandoffOutcome::Pending,
            completed_at: None,
        };
        self.active
            .lock()
            .await
            .insert(task_id.to_string(), in_flight.clone());

        let reassignment = self.registry.reassign_task(task_id, from_agent, to_agent).await;

        let record = match reassignment {
            Ok(_) => HandoffRecord {
                outcome: HandoffOutcome::Completed,
                completed_at: Some(chrono::Utc::now()),
                ..in_flight.clone()
            },
            Err(_) => HandoffRecord {
                outcome: HandoffOutcome::Failed,
                completed_at: Some(chrono::Utc::now()),
                ..in_flight.clone()
            },
        };

        self.append_history(record.clone()).await;
        self.active.lock().await.remove(task_id);

        if record.outcome == HandoffOutcome::Completed {
            let hint = self
                .registry
                .get_agent(to_agent)
                .await
                .and_then(|a| a.hint);
            self.notifications
                .deliver(
                    hint.as_ref(),
                    HandoffNotification {
                        task_id: task_id.to_string(),
                        from_agent: from_agent.to_string(),
                        to_agent: to_agent.to_string(),
                        enqueued_at: chrono::Utc::now(),
                    },
                )
                .await;
            info!(task = %task_id, from = %from_agent, to = %to_agent, "handoff executed");
        }

        reassignment.map(|_| record.clone()).or(Ok(record))
    }

    async fn append_history(&self, record: HandoffRecord) {
        let mut history = self.history.lock().await;
        if history.len() >= self.ring_capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    pub async fn stats(&self) -> HandoffStats {
        let history = self.history.lock().await;
        let total_handoffs = history.len();
        if total_handoffs == 0 {
            return HandoffStats {
                total_handoffs: 0,
                successful_handoffs: 0,
                success_rate_percent: 0.0,
                active_handoffs: self.active.lock().await.len(),
                handoffs_per_hour: 0.0,
            };
        }

        let successful_handoffs = history
            .iter()
            .filter(|h| h.outcome == HandoffOutcome::Completed)
            .count();
        let success_rate_percent = successful_handoffs as f64 / total_handoffs as f64 * 100.0;

        let now = chrono::Utc::now();
        let mut hourly_buckets = [0u32; 24];
        for record in history.iter() {
            let age = now - record.initiated_at;
            if age < chrono::Duration::hours(24) && age >= chrono::Duration::zero() {
                let bucket = (age.num_minutes() / 60).clamp(0, 23) as usize;
                hourly_buckets[bucket] += 1;
            }
        }
        let recent_total: u32 = hourly_buckets.iter().sum();
        let handoffs_per_hour = recent_total as f64 / 24.0;

        HandoffStats {
            total_handoffs,
            successful_handoffs,
            success_rate_percent,
            active_handoffs: self.active.lock().await.len(),
            handoffs_per_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationHub;
    use std::collections::HashSet;

    async fn registered_agent(registry: &Registry, id: &str, load: f64, active: u32) {
        registry.register_agent(id.into(), None, HashSet::new()).await.unwrap();
        registry.agents.update_load(id, load, active).await.unwrap();
    }

    #[tokio::test]
    async fn scenario_recommends_best_scoring_candidate() {
        let registry = Registry::new();
        registered_agent(&registry, "a1", 0.9, 4).await;
        registered_agent(&registry, "a2", 0.1, 0).await;
        let task = registry.create_task("m".into(), vec![], 5).await;
        registry.claim_next_pending_for_agent("a1").await.unwrap();

        let notifications = NotificationHub::new(8, 300, 10);
        let evaluator = HandoffEvaluator::new(registry.clone(), notifications, 10_000);

        let recommendation = evaluator.evaluate(&task.id, "a1").await.unwrap().unwrap();
        assert_eq!(recommendation.agent_id, "a2");
        // (1-0.1)*40 + (5-0)*10 + 0 (no completion history) + 20 (universal capability) = 106
        assert!((recommendation.total_score - 106.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn overloaded_candidate_is_not_eligible() {
        let registry = Registry::new();
        registered_agent(&registry, "a1", 0.1, 0).await;
        registered_agent(&registry, "a2", 0.9, 4).await;
        let task = registry.create_task("m".into(), vec![], 5).await;
        registry.claim_next_pending_for_agent("a1").await.unwrap();

        let notifications = NotificationHub::new(8, 300, 10);
        let evaluator = HandoffEvaluator::new(registry.clone(), notifications, 10_000);

        assert!(evaluator.evaluate(&task.id, "a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn execute_reassigns_and_records_history() {
        let registry = Registry::new();
        registered_agent(&registry, "a1", 0.9, 4).await;
        registered_agent(&registry, "a2", 0.1, 0).await;
        let task = registry.create_task("m".into(), vec![], 5).await;
        registry.claim_next_pending_for_agent("a1").await.unwrap();

        let notifications = NotificationHub::new(8, 300, 10);
        let evaluator = HandoffEvaluator::new(registry.clone(), notifications, 10_000);
        let record = evaluator.execute(&task.id, "a1", "a2").await.unwrap();

        assert_eq!(record.outcome, HandoffOutcome::Completed);
        assert_eq!(evaluator.active_count().await, 0);
        let stats = evaluator.stats().await;
        assert_eq!(stats.total_handoffs, 1);
        assert_eq!(stats.successful_handoffs, 1);
    }
}
