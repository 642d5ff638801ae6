// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host control channel.
//!
//! A host opens the channel, sends `register{capabilities}`, heartbeats
//! every 15 s, and serves the gateway's worktree/agent frames. On
//! disconnect the host is marked offline, its runner unregistered, and all
//! in-flight requests failed.

use crate::protocol::{GatewayFrame, HostFrame};
use crate::remote::{HostChannel, RemoteRunner};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a connecting host has to send its `register` frame.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn host_ws(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_host(state, socket))
}

async fn handle_host(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    // First frame must be register{capabilities}.
    let registration = tokio::time::timeout(REGISTER_TIMEOUT, stream.next()).await;
    let (name, capabilities) = match registration {
        Ok(Some(Ok(Message::Text(body)))) => {
            match serde_json::from_str::<HostFrame>(&body) {
                Ok(HostFrame::Register { name, capabilities }) => (name, capabilities),
                other => {
                    tracing::warn!(?other, "host channel opened without register frame");
                    return;
                }
            }
        }
        _ => {
            tracing::warn!("host channel closed before registration");
            return;
        }
    };

    let host = state.engine.hosts().register(name, capabilities.into());
    let host_id = host.host_id;

    let (out_tx, mut out_rx) = mpsc::channel::<GatewayFrame>(256);
    let channel = HostChannel::new(out_tx.clone());
    state.engine.register_runner(host_id, Arc::new(RemoteRunner::new(channel.clone())));
    state.publish_hosts();

    let _ = out_tx.send(GatewayFrame::Registered { host_id }).await;

    // Writer: drains the channel onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(body) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(body.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(body) = message else {
            continue;
        };
        match serde_json::from_str::<HostFrame>(&body) {
            Ok(HostFrame::Heartbeat) => {
                state.engine.hosts().heartbeat(&host_id);
            }
            Ok(frame) => channel.route_frame(frame),
            Err(e) => tracing::warn!(%host_id, error = %e, "bad host frame"),
        }
    }

    tracing::info!(%host_id, "host channel closed");
    state.engine.remove_runner(&host_id);
    state.engine.hosts().disconnect(&host_id);
    channel.disconnected();
    state.publish_hosts();
    writer.abort();
}
