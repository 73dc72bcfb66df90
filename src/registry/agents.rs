use crate::models::{AgentRecord, AgentStatus, AgentView, NetworkHint};
use crate::{HubError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Single source of truth for agent identity, liveness, and load state.
///
/// Mirrors the teacher's split `AgentRegistry`/`StatusManager` pair, merged
/// into one store: an ExoStack agent record already carries both identity
/// and the counters the teacher tracks separately.
#[derive(Clone)]
pub struct AgentStore {
    agents: Arc<RwLock<HashMap<String, AgentRecord>>>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register or re-register an agent. Re-registration with the same
    /// declared capabilities is a no-op that just refreshes the heartbeat;
    /// conflicting capabilities on an existing, still-live registration fail
    /// with `StateConflict` (the debounce window is approximated by "already
    /// known and online").
    pub async fn register(
        &self,
        id: String,
        hint: Option<NetworkHint>,
        capabilities: HashSet<String>,
    ) -> Result<AgentStatus> {
        let mut agents = self.agents.write().await;

        if let Some(existing) = agents.get_mut(&id) {
            if existing.status != AgentStatus::Offline && existing.capabilities != capabilities {
                warn!(agent = %id, "re-registration with conflicting capabilities");
                return Err(HubError::StateConflict(format!(
                    "agent {id} already registered with different capabilities"
                )));
            }
            existing.hint = hint;
            existing.capabilities = capabilities;
            existing.status = AgentStatus::Online;
            existing.last_heartbeat = chrono::Utc::now();
            info!(agent = %id, "agent re-registered");
            return Ok(AgentStatus::Online);
        }

        let mut record = AgentRecord::new(id.clone(), hint, capabilities);
        record.status = AgentStatus::Online;
        agents.insert(id.clone(), record);
        info!(agent = %id, "agent registered");
        Ok(AgentStatus::Online)
    }

    /// Record a heartbeat. Resurrects an offline agent to online. Out-of-order
    /// heartbeats (older than the stored timestamp) are dropped per the
    /// monotonicity guarantee.
    pub async fn record_heartbeat(
        &self,
        id: &str,
        load: Option<f64>,
        active_tasks: Option<u32>,
    ) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound(format!("agent {id} not registered")))?;

        let now = chrono::Utc::now();
        if now < agent.last_heartbeat {
            debug!(agent = %id, "dropped out-of-order heartbeat");
            return Ok(());
        }

        let was_offline = agent.status == AgentStatus::Offline;
        agent.last_heartbeat = now;
        if let Some(load) = load {
            agent.current_load = load.clamp(0.0, 1.0);
        }
        if let Some(active_tasks) = active_tasks {
            agent.active_tasks = active_tasks;
        }
        if was_offline {
            agent.status = AgentStatus::Online;
            info!(agent = %id, "agent resurrected from offline");
        }
        Ok(())
    }

    pub async fn update_load(&self, id: &str, load: f64, active_tasks: u32) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound(format!("agent {id} not registered")))?;
        agent.current_load = load.clamp(0.0, 1.0);
        agent.active_tasks = active_tasks;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<AgentRecord> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn list(&self, status: Option<AgentStatus>) -> Vec<AgentView> {
        self.agents
            .read()
            .await
            .values()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .map(AgentView::from)
            .collect()
    }

    pub async fn list_records(&self) -> Vec<AgentRecord> {
        self.agents.read().await.values().cloned().collect()
    }

    /// Mark an agent offline. Returns true if a transition actually occurred
    /// (idempotent: calling this on an already-offline agent is a no-op).
    pub async fn mark_offline(&self, id: &str) -> bool {
        let mut agents = self.agents.write().await;
        if let Some(agent) = agents.get_mut(id) {
            if agent.status != AgentStatus::Offline {
                agent.status = AgentStatus::Offline;
                warn!(agent = %id, "agent marked offline by liveness sweep");
                return true;
            }
        }
        false
    }

    pub async fn increment_active_tasks(&self, id: &str, delta: i64) {
        let mut agents = self.agents.write().await;
        if let Some(agent) = agents.get_mut(id) {
            agent.active_tasks = (agent.active_tasks as i64 + delta).max(0) as u32;
        }
    }

    pub async fn record_completion(&self, id: &str, success: bool) {
        let mut agents = self.agents.write().await;
        if let Some(agent) = agents.get_mut(id) {
            if success {
                agent.tasks_completed += 1;
            } else {
                agent.tasks_failed += 1;
            }
            agent.active_tasks = agent.active_tasks.saturating_sub(1);
        }
    }
}

impl Default for AgentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_get() {
        let store = AgentStore::new();
        store
            .register("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        let agent = store.get("a1").await.unwrap();
        assert_eq!(agent.status, AgentStatus::Online);
    }

    #[tokio::test]
    async fn heartbeat_resurrects_offline_agent() {
        let store = AgentStore::new();
        store
            .register("a1".into(), None, HashSet::new())
            .await
            .unwrap();
        store.mark_offline("a1").await;
        assert_eq!(store.get("a1").await.unwrap().status, AgentStatus::Offline);

        store.record_heartbeat("a1", None, None).await.unwrap();
        assert_eq!(store.get("a1").await.unwrap().status, AgentStatus::Online);
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_agent_is_not_found() {
        let store = AgentStore::new();
        let err = store.record_heartbeat("ghost", None, None).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = AgentStore::new();
        store.register("a1".into(), None, HashSet::new()).await.unwrap();
        store.register("a2".into(), None, HashSet::new()).await.unwrap();
        store.mark_offline("a2").await;

        let online = store.list(Some(AgentStatus::Online)).await;
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, "a1");

        let all = store.list(None).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn conflicting_reregistration_is_state_conflict() {
        let store = AgentStore::new();
        let mut caps = HashSet::new();
        caps.insert("m-small".to_string());
        store.register("a1".into(), None, caps).await.unwrap();

        let mut other_caps = HashSet::new();
        other_caps.insert("m-large".to_string());
        let result = store.register("a1".into(), None, other_caps).await;
        assert!(matches!(result, Err(HubError::StateConflict(_))));
    }
}
