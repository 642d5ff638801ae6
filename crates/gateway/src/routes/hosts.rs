// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host listing and model discovery.

use crate::dto::HostDto;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use vk_core::{AgentType, GatewayError, HostId};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    pub host_id: HostId,
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub agent_type: AgentType,
    pub models: Vec<&'static str>,
}

/// Known models per agent runtime. OpenCode discovers models at runtime;
/// for the CLI agents this static table mirrors what the CLIs accept.
fn models_for(agent_type: AgentType) -> Vec<&'static str> {
    match agent_type {
        AgentType::Opencode => {
            vec!["anthropic/claude-sonnet-4", "openai/gpt-5", "google/gemini-2.5-pro"]
        }
        AgentType::ClaudeCode => vec!["anthropic/claude-sonnet-4", "anthropic/claude-opus-4"],
        AgentType::Codex => vec!["openai/gpt-5-codex", "openai/o4-mini"],
        AgentType::GeminiCli => vec!["google/gemini-2.5-pro", "google/gemini-2.5-flash"],
        AgentType::Custom => Vec::new(),
    }
}

async fn list_hosts(State(state): State<AppState>) -> Json<Vec<HostDto>> {
    let hosts = state.engine.hosts().list().into_iter().map(HostDto::from).collect();
    Json(hosts)
}

async fn host_models(
    State(state): State<AppState>,
    Path(host_id): Path<HostId>,
) -> ApiResult<Json<ModelsResponse>> {
    let host = state
        .engine
        .hosts()
        .get(&host_id)
        .ok_or_else(|| GatewayError::not_found(format!("host {host_id} not found")))?;
    let models = host
        .capabilities
        .supported_agents
        .iter()
        .map(|&agent_type| ModelEntry { agent_type, models: models_for(agent_type) })
        .collect();
    Ok(Json(ModelsResponse { host_id, models }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/hosts", get(list_hosts))
        .route("/api/hosts/{hostId}/models", get(host_models))
}
