// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution control and run-history endpoints.

use crate::dto::{ExecutionDto, RunSummaryDto};
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use vk_core::{AgentType, ExecutionId, GatewayError, HostId, TaskId};
use vk_engine::ExecuteRequest;
use vk_storage::EventFilter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Explicit target host; auto-selection otherwise.
    #[serde(default)]
    pub host_id: Option<HostId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub task_id: TaskId,
    pub execution_id: ExecutionId,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBody {
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputResponse {
    pub delivered: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub cleaned: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub agent_event_kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub events: Vec<vk_core::ExecutionEvent>,
    pub has_more: bool,
}

const DEFAULT_EVENT_LIMIT: usize = 100;
const MAX_EVENT_LIMIT: usize = 1000;

async fn execute(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
    body: Option<Json<ExecuteBody>>,
) -> ApiResult<(StatusCode, Json<ExecuteResponse>)> {
    let body = body.map(|Json(b)| b).unwrap_or(ExecuteBody {
        agent_type: None,
        base_branch: None,
        model: None,
        host_id: None,
    });
    let agent_type = match body.agent_type.as_deref() {
        Some(raw) => Some(AgentType::parse(raw).ok_or_else(|| {
            GatewayError::validation(format!("unknown agent type: {raw:?}"))
        })?),
        None => None,
    };
    let request = ExecuteRequest {
        agent_type,
        base_branch: body.base_branch,
        model: body.model,
        host: body.host_id,
    };
    let execution_id = state.engine.start_execution(&task_id, request)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ExecuteResponse { task_id, execution_id, status: "started" }),
    ))
}

async fn abort(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<StatusCode> {
    state.engine.abort_execution(&task_id)?;
    Ok(StatusCode::OK)
}

async fn input(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
    Json(body): Json<InputBody>,
) -> ApiResult<Json<InputResponse>> {
    let delivered = state.engine.send_input(&task_id, &body.content).await?;
    Ok(Json(InputResponse { delivered }))
}

async fn cleanup(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<Json<CleanupResponse>> {
    let cleaned = state.engine.cleanup_worktree(&task_id).await?;
    Ok(Json(CleanupResponse { cleaned }))
}

async fn execution_status(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<Json<ExecutionDto>> {
    let execution = state
        .engine
        .execution_status(&task_id)?
        .ok_or_else(|| GatewayError::not_found(format!("task {task_id} has no executions")))?;
    Ok(Json(execution.into()))
}

async fn list_runs(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<Json<Vec<RunSummaryDto>>> {
    let runs = state.engine.list_runs(&task_id)?;
    Ok(Json(runs.into_iter().map(RunSummaryDto::from).collect()))
}

async fn run_events(
    State(state): State<AppState>,
    Path((task_id, execution_id)): Path<(TaskId, ExecutionId)>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let filter =
        EventFilter { kind: query.kind, agent_event_kind: query.agent_event_kind };
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
    let page = state.engine.read_events(&task_id, &execution_id, &filter, offset, limit)?;
    Ok(Json(EventsResponse { events: page.events, has_more: page.has_more }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tasks/{id}/execute", post(execute))
        .route("/api/tasks/{id}/abort", post(abort))
        .route("/api/tasks/{id}/input", post(input))
        .route("/api/tasks/{id}/cleanup", post(cleanup))
        .route("/api/tasks/{id}/execution-status", get(execution_status))
        .route("/api/tasks/{id}/runs", get(list_runs))
        .route("/api/tasks/{id}/runs/{executionId}/events", get(run_events))
}
