// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Websocket endpoints: the client subscription channel and the host
//! control channel.

mod client;
mod host;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/client", get(client::client_ws))
        .route("/ws/host", get(host::host_ws))
}
