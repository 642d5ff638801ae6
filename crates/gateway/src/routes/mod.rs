// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST surface of the gateway.

mod executions;
mod health;
mod hosts;
mod tasks;

use crate::state::AppState;
use axum::Router;
use tower_http::cors::CorsLayer;

/// Assemble the full HTTP router: REST plus the websocket endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(tasks::router())
        .merge(executions::router())
        .merge(hosts::router())
        .merge(health::router())
        .merge(crate::ws::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
