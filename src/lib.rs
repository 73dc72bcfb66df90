//! # ExoStack Hub
//!
//! The hub-side coordination core of a distributed inference cluster: node
//! registry, priority task scheduler, a pull-model dispatch API, a liveness
//! monitor, and a peer-to-peer handoff evaluator. Inference execution itself
//! (model loading, token generation) lives on the agent side and is opaque
//! to this crate — the hub only ever sees a model identifier and bytes.
//!
//! ## Architecture
//!
//! - **Registry**: single source of truth for agent and task state.
//! - **Scheduler**: priority queueing, retry policy, starvation relief.
//! - **Dispatch API**: a thin axum adapter over the above.
//! - **Liveness monitor**: periodic sweep that demotes silent agents and
//!   reclaims their orphaned work.
//! - **Handoff evaluator**: recommends and executes peer-to-peer task
//!   reassignment between agents.

/// Application composition root: the explicit collaborator struct tests and
/// `main` construct in place of module-level singletons.
pub mod app;
/// HTTP API server and endpoints
pub mod api;
/// System configuration
pub mod config;
/// System-wide constants
pub mod constants;
/// Error types and handling
pub mod error;
/// Peer-to-peer handoff evaluation
pub mod handoff;
/// Liveness monitoring and orphan reclamation
pub mod liveness;
/// Core data models
pub mod models;
/// Handoff notification delivery
pub mod notify;
/// Agent and task registry
pub mod registry;
/// Scheduling policy: priority, retry, starvation relief
pub mod scheduler;

pub use config::HubConfig;
pub use error::{HubError, Result};
