//! Thin axum adapter over [`AppContext`] implementing the wire surface of §6.
//! Request-layer framing is explicitly out of scope as a core concern — this
//! module exists only to expose the Dispatch API operations over HTTP, the
//! way the teacher's `ApiServer` exposes its orchestrator.

pub mod dto;

use crate::app::AppContext;
use crate::models::{AgentStatus, TaskStatus};
use crate::scheduler::RetryDecision;
use crate::{HubConfig, HubError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use dto::*;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

const ROUTE_NODES_REGISTER: &str = "/nodes/register";
const ROUTE_NODES_HEARTBEAT: &str = "/nodes/heartbeat";
const ROUTE_NODES_STATUS: &str = "/nodes/status";
const ROUTE_TASKS_CREATE: &str = "/tasks/create";
const ROUTE_TASKS_BATCH: &str = "/tasks/batch";
const ROUTE_TASK_BY_ID: &str = "/tasks/{task_id}";
const ROUTE_TASKS_STATUS: &str = "/tasks/status";
const ROUTE_TASKS_QUEUE_PENDING: &str = "/tasks/queue/pending";
const ROUTE_TASKS_QUEUE_RUNNING: &str = "/tasks/queue/running";
const ROUTE_AGENT_NEXT: &str = "/tasks/agent/{agent_id}/next";
const ROUTE_AGENT_COMPLETE: &str = "/tasks/agent/{agent_id}/complete/{task_id}";
const ROUTE_AGENT_FAIL: &str = "/tasks/agent/{agent_id}/fail/{task_id}";
const ROUTE_HANDOFF_EVALUATE: &str = "/handoff/{task_id}/evaluate";
const ROUTE_HANDOFF_EXECUTE: &str = "/handoff/{task_id}/execute";
const ROUTE_HANDOFF_STATS: &str = "/handoff/stats";
const ROUTE_HEALTH: &str = "/health";

#[derive(Clone)]
pub struct ApiServer {
    ctx: AppContext,
    config: HubConfig,
}

impl ApiServer {
    pub fn new(ctx: AppContext, config: HubConfig) -> Self {
        Self { ctx, config }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route(ROUTE_HEALTH, get(health_check))
            .route(ROUTE_NODES_REGISTER, post(register_agent))
            .route(ROUTE_NODES_HEARTBEAT, post(heartbeat))
            .route(ROUTE_NODES_STATUS, get(list_agents))
            .route(ROUTE_TASKS_CREATE, post(create_task))
            .route(ROUTE_TASKS_BATCH, post(create_task_batch))
            .route(ROUTE_TASK_BY_ID, get(get_task))
            .route(ROUTE_TASK_BY_ID, put(update_task_status))
            .route(ROUTE_TASK_BY_ID, delete(cancel_task))
            .route(ROUTE_TASKS_STATUS, get(list_tasks))
            .route(ROUTE_TASKS_QUEUE_PENDING, get(list_pending))
            .route(ROUTE_TASKS_QUEUE_RUNNING, get(list_running))
            .route(ROUTE_AGENT_NEXT, get(claim_next))
            .route(ROUTE_AGENT_COMPLETE, post(complete_task))
            .route(ROUTE_AGENT_FAIL, post(fail_task))
            .route(ROUTE_HANDOFF_EVALUATE, get(evaluate_handoff))
            .route(ROUTE_HANDOFF_EXECUTE, post(execute_handoff))
            .route(ROUTE_HANDOFF_STATS, get(handoff_stats))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::new().allow_origin(Any).allow_methods([
                        axum::http::Method::GET,
                        axum::http::Method::POST,
                        axum::http::Method::PUT,
                        axum::http::Method::DELETE,
                    ])),
            )
            .with_state(self)
    }

    pub async fn run(self) -> crate::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_host, self.config.bind_port)
            .parse()
            .map_err(|e| HubError::Internal(anyhow::anyhow!("invalid bind address: {e}")))?;
        info!(%addr, "exostack hub listening");
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| HubError::Internal(anyhow::anyhow!("failed to bind: {e}")))?;
        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| HubError::Internal(anyhow::anyhow!("server error: {e}")))?;
        Ok(())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = match &self {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::StateConflict(_) => StatusCode::CONFLICT,
            HubError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            HubError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            HubError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            HubError::Internal(_) | HubError::Config(_) | HubError::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorEnvelope {
            ok: false,
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, HubError>;

async fn health_check() -> &'static str {
    "ok"
}

async fn register_agent(
    State(server): State<ApiServer>,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<RegisterAgentResponse> {
    let hint = match (req.host, req.port) {
        (Some(host), Some(port)) => Some(crate::models::NetworkHint { host, port }),
        _ => None,
    };
    let status = server
        .ctx
        .register_agent(req.id.clone(), hint, req.capabilities)
        .await?;
    Ok(Json(RegisterAgentResponse {
        agent_id: req.id,
        status: format!("{status:?}").to_lowercase(),
    }))
}

async fn heartbeat(
    State(server): State<ApiServer>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<HeartbeatResponse> {
    let notifications = server
        .ctx
        .heartbeat(&req.id, req.load, req.active_tasks)
        .await?;
    Ok(Json(HeartbeatResponse {
        notifications: notifications
            .into_iter()
            .map(|n| HandoffNotificationDto {
                task_id: n.task_id,
                from_agent: n.from_agent,
            })
            .collect(),
    }))
}

async fn list_agents(
    State(server): State<ApiServer>,
    Query(params): Query<AgentQueryParams>,
) -> ApiResult<AgentsListResponse> {
    let status = params.status.as_deref().map(parse_agent_status).transpose()?;
    Ok(Json(server.ctx.list_agents(status).await))
}

fn parse_agent_status(raw: &str) -> Result<AgentStatus, HubError> {
    match raw {
        "registering" => Ok(AgentStatus::Registering),
        "online" => Ok(AgentStatus::Online),
        "draining" => Ok(AgentStatus::Draining),
        "offline" => Ok(AgentStatus::Offline),
        other => Err(HubError::InvalidArgument(format!("unknown agent status {other}"))),
    }
}

async fn create_task(
    State(server): State<ApiServer>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<CreateTaskResponse> {
    let task = server
        .ctx
        .submit_task(req.model, req.input_data, req.priority)
        .await;
    Ok(Json(CreateTaskResponse {
        task_id: task.id,
        status: "created".to_string(),
    }))
}

async fn create_task_batch(
    State(server): State<ApiServer>,
    Json(requests): Json<Vec<CreateTaskRequest>>,
) -> ApiResult<BatchCreateResponse> {
    let batch = requests
        .into_iter()
        .map(|r| (r.model, r.input_data, r.priority))
        .collect();
    let created = server.ctx.submit_batch(batch).await;
    Ok(Json(BatchCreateResponse {
        count: created.len(),
        task_ids: created.into_iter().map(|t| t.id).collect(),
    }))
}

async fn get_task(
    State(server): State<ApiServer>,
    Path(task_id): Path<String>,
) -> Result<Json<crate::models::TaskView>, HubError> {
    server
        .ctx
        .get_task(&task_id)
        .await
        .map(|t| Json((&t).into()))
        .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))
}

async fn update_task_status(
    State(server): State<ApiServer>,
    Path(task_id): Path<String>,
    Json(req): Json<TaskStatusUpdateRequest>,
) -> Result<Json<crate::models::TaskView>, HubError> {
    let task = server
        .ctx
        .get_task(&task_id)
        .await
        .ok_or_else(|| HubError::NotFound(format!("task {task_id} not found")))?;

    let new_status = parse_status(&req.status)?;
    let updated = server
        .ctx
        .registry
        .transition_task(&task_id, task.status, new_status, req.result)
        .await?;
    Ok(Json((&updated).into()))
}

fn parse_status(raw: &str) -> Result<TaskStatus, HubError> {
    match raw {
        "pending" => Ok(TaskStatus::Pending),
        "assigned" => Ok(TaskStatus::Assigned),
        "running" => Ok(TaskStatus::Running),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(HubError::InvalidArgument(format!("unknown status {other}"))),
    }
}

async fn cancel_task(
    State(server): State<ApiServer>,
    Path(task_id): Path<String>,
) -> ApiResult<CancellationResponse> {
    let task = server.ctx.cancel_task(&task_id).await?;
    Ok(Json(CancellationResponse {
        task_id: task.id,
        status: "cancelled".to_string(),
    }))
}

async fn list_tasks(
    State(server): State<ApiServer>,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<TasksListResponse> {
    let status = params.status.as_deref().map(parse_status).transpose()?;
    Ok(Json(server.ctx.list_tasks(status, params.limit).await))
}

async fn list_pending(State(server): State<ApiServer>) -> ApiResult<TasksListResponse> {
    Ok(Json(server.ctx.list_tasks(Some(TaskStatus::Pending), None).await))
}

async fn list_running(State(server): State<ApiServer>) -> ApiResult<TasksListResponse> {
    Ok(Json(server.ctx.list_tasks(Some(TaskStatus::Running), None).await))
}

async fn claim_next(
    State(server): State<ApiServer>,
    Path(agent_id): Path<String>,
) -> ApiResult<ClaimResponse> {
    match server.ctx.claim_next_task(&agent_id).await? {
        Some(task) => Ok(Json(ClaimResponse::Task((&task).into()))),
        None => Ok(Json(ClaimResponse::Empty { empty: true })),
    }
}

async fn complete_task(
    State(server): State<ApiServer>,
    Path((agent_id, task_id)): Path<(String, String)>,
    Json(req): Json<CompletionRequest>,
) -> ApiResult<OkResponse> {
    server
        .ctx
        .report_completion(
            &task_id,
            &agent_id,
            req.output,
            req.tokens_generated,
            req.processing_time,
        )
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn fail_task(
    State(server): State<ApiServer>,
    Path((agent_id, task_id)): Path<(String, String)>,
    Json(req): Json<FailureRequest>,
) -> ApiResult<OkResponse> {
    let decision = server
        .ctx
        .report_failure(&task_id, &agent_id, req.error_kind, req.message)
        .await?;
    match decision {
        RetryDecision::Requeued(_) | RetryDecision::Failed(_) => Ok(Json(OkResponse { ok: true })),
    }
}

async fn evaluate_handoff(
    State(server): State<ApiServer>,
    Path(task_id): Path<String>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> ApiResult<Option<crate::handoff::HandoffCandidate>> {
    let current_agent_id = params
        .get("current_agent_id")
        .ok_or_else(|| HubError::InvalidArgument("current_agent_id query param required".into()))?;
    Ok(Json(
        server.ctx.evaluate_handoff(&task_id, current_agent_id).await?,
    ))
}

#[derive(serde::Deserialize)]
struct ExecuteHandoffRequest {
    from_agent: String,
    to_agent: String,
}

async fn execute_handoff(
    State(server): State<ApiServer>,
    Path(task_id): Path<String>,
    Json(req): Json<ExecuteHandoffRequest>,
) -> ApiResult<crate::models::HandoffRecord> {
    let record = server
        .ctx
        .execute_handoff(&task_id, &req.from_agent, &req.to_agent)
        .await?;
    Ok(Json(record))
}

async fn handoff_stats(State(server): State<ApiServer>) -> ApiResult<HandoffStatsResponse> {
    Ok(Json(server.ctx.handoff_stats().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_server() -> ApiServer {
        ApiServer::new(AppContext::new(HubConfig::default()), HubConfig::default())
    }

    #[tokio::test]
    async fn health_check_returns_ok() {
        let router = test_server().build_router();
        let response = router
            .oneshot(Request::builder().uri(ROUTE_HEALTH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_unknown_task_is_404() {
        let router = test_server().build_router();
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/tasks/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
