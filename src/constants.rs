//! System-wide default values. Each is overridable via `HubConfig`; these are
//! the fallbacks applied when the corresponding environment variable is unset.

/// Liveness sweep cadence. 5s balances prompt offline detection against
/// sweep overhead on a large agent fleet.
pub const DEFAULT_SWEEP_PERIOD_SECS: u64 = 5;

/// An agent silent for longer than this is declared offline by the liveness monitor.
pub const DEFAULT_OFFLINE_THRESHOLD_SECS: u64 = 30;

/// A pending task waiting longer than this without a capable claimant has its
/// effective priority decremented on each sweep to avoid starvation.
pub const DEFAULT_STALE_PENDING_THRESHOLD_SECS: u64 = 60;

/// Retry ceiling for transient failures before a task is failed outright.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Deadline for a direct push notification to an agent.
pub const DEFAULT_PUSH_DEADLINE_SECS: u64 = 10;

/// Deadline the core allows for a heartbeat round-trip.
pub const DEFAULT_HEARTBEAT_DEADLINE_SECS: u64 = 5;

/// TTL for a queued (undelivered) notification before it is dropped.
pub const DEFAULT_NOTIFICATION_TTL_SECS: u64 = 300;

/// Per-agent notification queue bound; oldest entries are dropped on overflow.
pub const DEFAULT_NOTIFICATION_QUEUE_CAPACITY: usize = 64;

/// Handoff history ring capacity.
pub const DEFAULT_HANDOFF_RING_CAPACITY: usize = 10_000;

/// How long a terminal task record is retained before it is eligible for GC.
pub const DEFAULT_TASK_RETENTION_HOURS: i64 = 24;

/// Default HTTP bind address for the dispatch API.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";
pub const DEFAULT_BIND_PORT: u16 = 7700;

// Handoff scoring weights (§4.5). Kept as named constants rather than magic
// numbers scattered through `handoff.rs`.
pub const HANDOFF_LOAD_WEIGHT: f64 = 40.0;
pub const HANDOFF_CAPACITY_WEIGHT: f64 = 10.0;
pub const HANDOFF_CAPACITY_CEILING: i64 = 5;
pub const HANDOFF_RELIABILITY_WEIGHT: f64 = 30.0;
pub const HANDOFF_CAPABILITY_BONUS: f64 = 20.0;
pub const HANDOFF_RECOMMEND_THRESHOLD: f64 = 50.0;
pub const HANDOFF_ELIGIBLE_LOAD_CEILING: f64 = 0.7;
pub const HANDOFF_ELIGIBLE_ACTIVE_TASKS_CEILING: u32 = 3;
