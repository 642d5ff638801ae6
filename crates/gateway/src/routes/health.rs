// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health endpoint.

use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub worker_url: String,
    pub data_dir: String,
    pub feature_flags: FeatureFlags,
    pub uptime_ms: u64,
    pub active_executions: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub memory_enhanced: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let status = if state.engine.is_accepting() { "ok" } else { "degraded" };
    Json(HealthResponse {
        status,
        version: crate::env::VERSION,
        worker_url: state.config.worker_url.clone(),
        data_dir: state.config.data_dir.display().to_string(),
        feature_flags: FeatureFlags { memory_enhanced: state.config.memory_enhanced },
        uptime_ms: now.saturating_sub(state.started_at_ms),
        active_executions: state.engine.active_count(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
