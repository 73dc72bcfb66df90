//! Fixed-cadence liveness sweep (§4.4): demotes silent agents to offline,
//! triggers orphan reclamation for whatever they were running, relieves
//! starvation in the pending queue, and prunes expired handoff notifications.
//! Mirrors the teacher's `cleanup_loop` shape (`tokio::time::interval` over a
//! retention-window filter), generalized from storage GC to liveness GC.

use crate::notify::NotificationHub;
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::models::AgentStatus;
use std::time::Duration;
use tracing::info;

pub struct LivenessMonitor {
    registry: Registry,
    scheduler: Scheduler,
    notifications: NotificationHub,
    sweep_period: Duration,
    offline_threshold: chrono::Duration,
}

impl LivenessMonitor {
    pub fn new(
        registry: Registry,
        scheduler: Scheduler,
        notifications: NotificationHub,
        sweep_period_secs: u64,
        offline_threshold_secs: u64,
    ) -> Self {
        Self {
            registry,
            scheduler,
            notifications,
            sweep_period: Duration::from_secs(sweep_period_secs),
            offline_threshold: chrono::Duration::seconds(offline_threshold_secs as i64),
        }
    }

    /// Run the sweep loop forever. Intended to be spawned as a background
    /// task and raced against the API server in `main`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.sweep_period);
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    async fn sweep_once(&self) {
        let cutoff = chrono::Utc::now() - self.offline_threshold;
        for agent in self.registry.list_agents(None).await {
            if agent.status == AgentStatus::Offline {
                continue;
            }
            if agent.last_heartbeat < cutoff {
                let reclaimed = self.scheduler.reclaim_orphans_for(&agent.id).await;
                if !reclaimed.is_empty() {
                    info!(
                        agent = %agent.id,
                        reclaimed = reclaimed.len(),
                        "reclaimed orphaned tasks from silent agent"
                    );
                }
            }
        }

        let bumped = self.scheduler.relieve_starvation().await;
        if !bumped.is_empty() {
            info!(count = bumped.len(), "bumped priority of stale pending tasks");
        }

        self.notifications.prune_expired().await;
    }
}
