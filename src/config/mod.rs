use crate::constants::*;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Layered hub configuration, sourced from `EXOSTACK_`-prefixed environment
/// variables (after a local `.env` is loaded, if present), falling back to
/// the documented defaults in `constants.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub sweep_period_secs: u64,
    pub offline_threshold_secs: u64,
    pub stale_pending_threshold_secs: u64,
    pub max_attempts: u32,
    pub push_deadline_secs: u64,
    pub heartbeat_deadline_secs: u64,
    pub notification_ttl_secs: u64,
    pub notification_queue_capacity: usize,
    pub handoff_ring_capacity: usize,
    pub task_retention_hours: i64,
    pub bind_host: String,
    pub bind_port: u16,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            sweep_period_secs: DEFAULT_SWEEP_PERIOD_SECS,
            offline_threshold_secs: DEFAULT_OFFLINE_THRESHOLD_SECS,
            stale_pending_threshold_secs: DEFAULT_STALE_PENDING_THRESHOLD_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            push_deadline_secs: DEFAULT_PUSH_DEADLINE_SECS,
            heartbeat_deadline_secs: DEFAULT_HEARTBEAT_DEADLINE_SECS,
            notification_ttl_secs: DEFAULT_NOTIFICATION_TTL_SECS,
            notification_queue_capacity: DEFAULT_NOTIFICATION_QUEUE_CAPACITY,
            handoff_ring_capacity: DEFAULT_HANDOFF_RING_CAPACITY,
            task_retention_hours: DEFAULT_TASK_RETENTION_HOURS,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            bind_port: DEFAULT_BIND_PORT,
        }
    }
}

impl HubConfig {
    /// Load configuration from the environment, falling back to defaults for
    /// anything unset. Unlike an agent-authenticated service, there is no
    /// secret material to validate here — trust boundary is the cluster
    /// network, per the non-goals.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from {:?}", path),
            Err(e) => tracing::debug!("no .env file loaded: {}", e),
        }

        let defaults = HubConfig::default();
        let source = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("EXOSTACK")
                    .try_parsing(true)
                    .separator("_"),
            )
            .build()?;

        let get_u64 = |key: &str, default: u64| -> u64 {
            source.get_int(key).map(|v| v as u64).unwrap_or(default)
        };
        let get_i64 = |key: &str, default: i64| -> i64 {
            source.get_int(key).unwrap_or(default)
        };
        let get_usize = |key: &str, default: usize| -> usize {
            source.get_int(key).map(|v| v as usize).unwrap_or(default)
        };
        let get_u32 = |key: &str, default: u32| -> u32 {
            source.get_int(key).map(|v| v as u32).unwrap_or(default)
        };
        let get_string = |key: &str, default: &str| -> String {
            source
                .get_string(key)
                .unwrap_or_else(|_| default.to_string())
        };
        let get_port = |key: &str, default: u16| -> u16 {
            source.get_int(key).map(|v| v as u16).unwrap_or(default)
        };

        Ok(HubConfig {
            sweep_period_secs: get_u64("sweep_period_secs", defaults.sweep_period_secs),
            offline_threshold_secs: get_u64(
                "offline_threshold_secs",
                defaults.offline_threshold_secs,
            ),
            stale_pending_threshold_secs: get_u64(
                "stale_pending_threshold_secs",
                defaults.stale_pending_threshold_secs,
            ),
            max_attempts: get_u32("max_attempts", defaults.max_attempts),
            push_deadline_secs: get_u64("push_deadline_secs", defaults.push_deadline_secs),
            heartbeat_deadline_secs: get_u64(
                "heartbeat_deadline_secs",
                defaults.heartbeat_deadline_secs,
            ),
            notification_ttl_secs: get_u64(
                "notification_ttl_secs",
                defaults.notification_ttl_secs,
            ),
            notification_queue_capacity: get_usize(
                "notification_queue_capacity",
                defaults.notification_queue_capacity,
            ),
            handoff_ring_capacity: get_usize(
                "handoff_ring_capacity",
                defaults.handoff_ring_capacity,
            ),
            task_retention_hours: get_i64("task_retention_hours", defaults.task_retention_hours),
            bind_host: get_string("bind_host", &defaults.bind_host),
            bind_port: get_port("bind_port", defaults.bind_port),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = HubConfig::default();
        assert_eq!(config.offline_threshold_secs, DEFAULT_OFFLINE_THRESHOLD_SECS);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.bind_port, DEFAULT_BIND_PORT);
    }
}
