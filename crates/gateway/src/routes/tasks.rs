// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task CRUD endpoints.

use crate::dto::TaskDto;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use vk_core::{AgentType, GatewayError, KanbanStatus, TaskConfig, TaskFilter, TaskId};
use vk_engine::TaskPatch;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<KanbanStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub model: Option<Option<String>>,
}

fn parse_agent(raw: &str) -> Result<AgentType, GatewayError> {
    AgentType::parse(raw)
        .ok_or_else(|| GatewayError::validation(format!("unknown agent type: {raw:?}")))
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskDto>)> {
    let mut config = TaskConfig::builder(req.title);
    if let Some(description) = req.description {
        config = config.description(description);
    }
    if let Some(workspace_id) = req.workspace_id {
        config = config.workspace_id(workspace_id);
    }
    if let Some(project_id) = req.project_id {
        config = config.project_id(project_id);
    }
    if let Some(agent) = req.agent_type.as_deref() {
        config = config.agent_type(parse_agent(agent)?);
    }
    if let Some(base_branch) = req.base_branch {
        config = config.base_branch(base_branch);
    }
    if let Some(model) = req.model {
        config = config.model(model);
    }

    let task = state.engine.create_task(config.build())?;
    Ok((StatusCode::CREATED, Json(task.into())))
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Json<Vec<TaskDto>> {
    let filter = TaskFilter {
        workspace_id: query.workspace_id,
        project_id: query.project_id,
        kanban_status: query.status,
    };
    let tasks = state.engine.tasks().list(&filter).into_iter().map(TaskDto::from).collect();
    Json(tasks)
}

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<Json<TaskDto>> {
    let task = state.engine.tasks().require(&task_id)?;
    Ok(Json(task.into()))
}

async fn patch_task(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
    Json(req): Json<PatchTaskRequest>,
) -> ApiResult<Json<TaskDto>> {
    let agent_type = match req.agent_type.as_deref() {
        Some(raw) => Some(parse_agent(raw).map_err(ApiError)?),
        None => None,
    };
    let patch = TaskPatch {
        title: req.title,
        description: req.description,
        agent_type,
        base_branch: req.base_branch,
        model: req.model,
    };
    let task = state.engine.tasks().update_task_meta(&task_id, patch)?;
    Ok(Json(task.into()))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<StatusCode> {
    state.engine.tasks().delete_task(&task_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", get(get_task).patch(patch_task).delete(delete_task))
}
