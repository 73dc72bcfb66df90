//! Request/response bodies for the wire surface in §6. Plain serde structs;
//! translation to/from the registry's internal types happens in `mod.rs`.

use crate::models::{AgentView, HandoffStats, TaskOutcome, TaskView};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub id: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub capabilities: HashSet<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterAgentResponse {
    pub agent_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub id: String,
    pub load: Option<f64>,
    pub active_tasks: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub notifications: Vec<HandoffNotificationDto>,
}

#[derive(Debug, Serialize)]
pub struct HandoffNotificationDto {
    pub task_id: String,
    pub from_agent: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub model: String,
    pub input_data: Vec<u8>,
    #[serde(default = "crate::models::default_priority")]
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub task_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct BatchCreateResponse {
    pub task_ids: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct TaskStatusUpdateRequest {
    pub status: String,
    pub result: Option<TaskOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub limit: Option<usize>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentQueryParams {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancellationResponse {
    pub task_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ClaimResponse {
    Task(TaskView),
    Empty { empty: bool },
}

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub output: Vec<u8>,
    pub tokens_generated: Option<u64>,
    pub processing_time: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FailureRequest {
    pub error_kind: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorBody,
}

pub type AgentsListResponse = Vec<AgentView>;
pub type TasksListResponse = Vec<TaskView>;
pub type HandoffStatsResponse = HandoffStats;
