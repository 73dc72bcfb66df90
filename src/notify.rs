//! Handoff-notification delivery (§4.5, §5): direct push to an agent's
//! advertised network hint with a hard deadline, falling back to a bounded,
//! TTL'd per-agent queue drained on the agent's next heartbeat. Enqueuing
//! never happens while a registry lock is held — this type is reached only
//! after the registry call that triggered the notification has returned.

use crate::models::NetworkHint;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct HandoffNotification {
    pub task_id: String,
    pub from_agent: String,
    pub to_agent: String,
    #[serde(skip)]
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct NotificationHub {
    queues: Arc<Mutex<HashMap<String, VecDeque<HandoffNotification>>>>,
    capacity: usize,
    ttl: chrono::Duration,
    push_deadline: Duration,
    client: reqwest::Client,
}

impl NotificationHub {
    pub fn new(capacity: usize, ttl_secs: u64, push_deadline_secs: u64) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            ttl: chrono::Duration::seconds(ttl_secs as i64),
            push_deadline: Duration::from_secs(push_deadline_secs),
            client: reqwest::Client::new(),
        }
    }

    /// Deliver a handoff notification: try a direct push within the deadline
    /// first, and only fall back to the queue if that fails or the agent has
    /// no advertised network hint.
    pub async fn deliver(&self, hint: Option<&NetworkHint>, notification: HandoffNotification) {
        if let Some(hint) = hint {
            if self.try_direct_push(hint, &notification).await {
                return;
            }
        }
        self.enqueue(notification).await;
    }

    async fn try_direct_push(&self, hint: &NetworkHint, notification: &HandoffNotification) -> bool {
        let url = format!("http://{}:{}/handoff/receive", hint.host, hint.port);
        let result = self
            .client
            .post(&url)
            .timeout(self.push_deadline)
            .json(notification)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(agent = %notification.to_agent, "direct handoff push delivered");
                true
            }
            Ok(response) => {
                warn!(agent = %notification.to_agent, status = %response.status(), "direct push rejected");
                false
            }
            Err(err) => {
                warn!(agent = %notification.to_agent, error = %err, "direct push failed, falling back to queue");
                false
            }
        }
    }

    async fn enqueue(&self, notification: HandoffNotification) {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(notification.to_agent.clone()).or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(notification);
    }

    /// Drain every non-expired notification queued for an agent. Called when
    /// the agent heartbeats.
    pub async fn drain(&self, agent_id: &str) -> Vec<HandoffNotification> {
        let mut queues = self.queues.lock().await;
        let Some(queue) = queues.get_mut(agent_id) else {
            return Vec::new();
        };
        let cutoff = chrono::Utc::now() - self.ttl;
        queue.retain(|n| n.enqueued_at > cutoff);
        queue.drain(..).collect()
    }

    /// Prune expired notifications from every queue. Called by the liveness
    /// sweep so queues for agents that never heartbeat again don't grow
    /// unboundedly stale.
    pub async fn prune_expired(&self) {
        let mut queues = self.queues.lock().await;
        let cutoff = chrono::Utc::now() - self.ttl;
        for queue in queues.values_mut() {
            queue.retain(|n| n.enqueued_at > cutoff);
        }
        queues.retain(|_, queue| !queue.is_empty());
    }
}
