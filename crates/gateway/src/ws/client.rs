// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client subscription channel.
//!
//! On connect the client receives a full `kanban:sync`; afterwards it gets
//! `task:status` + `kanban:sync` on task changes, `host:update` on host
//! changes, and `task:execution_event` streams for executions it started
//! or asked history for. Slow clients lose frames rather than stalling the
//! engine.

use crate::protocol::{ClientFrame, ServerFrame};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use vk_engine::ExecuteRequest;

pub async fn client_ws(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_client(state, socket))
}

async fn handle_client(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(256);

    // Writer: serialises frames onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(body) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(body.into())).await.is_err() {
                break;
            }
        }
    });

    send(&tx, ServerFrame::KanbanSync { board: state.engine.tasks().board() });

    // Task changes → coarse status + board sync.
    let changes_tx = tx.clone();
    let changes_state = state.clone();
    let changes_task = tokio::spawn(async move {
        let mut changes = changes_state.engine.tasks().changes();
        while let Ok(change) = changes.recv().await {
            if let Some(after) = &change.after {
                send(
                    &changes_tx,
                    ServerFrame::TaskStatus {
                        task_id: change.task_id,
                        status: after.kanban_status,
                    },
                );
            }
            send(
                &changes_tx,
                ServerFrame::KanbanSync { board: changes_state.engine.tasks().board() },
            );
        }
    });

    // Host registry changes.
    let hosts_tx = tx.clone();
    let mut host_updates = state.host_updates.subscribe();
    let hosts_task = tokio::spawn(async move {
        while let Ok(hosts) = host_updates.recv().await {
            send(&hosts_tx, ServerFrame::HostUpdate { hosts });
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(body) = message else {
            continue;
        };
        match serde_json::from_str::<ClientFrame>(&body) {
            Ok(frame) => handle_frame(&state, &tx, frame).await,
            Err(e) => {
                send(
                    &tx,
                    ServerFrame::Error {
                        error: vk_core::GatewayError::validation(format!("bad frame: {e}")),
                    },
                );
            }
        }
    }

    changes_task.abort();
    hosts_task.abort();
    writer.abort();
}

async fn handle_frame(state: &AppState, tx: &mpsc::Sender<ServerFrame>, frame: ClientFrame) {
    match frame {
        ClientFrame::TaskExecute { task_id, agent_type, base_branch, model } => {
            let request = ExecuteRequest { agent_type, base_branch, model, host: None };
            match state.engine.start_execution(&task_id, request) {
                Ok(_) => follow_execution(state, tx, &task_id, 0),
                Err(error) => send(tx, ServerFrame::Error { error }),
            }
        }
        ClientFrame::TaskStop { task_id } => {
            if let Err(error) = state.engine.abort_execution(&task_id) {
                send(tx, ServerFrame::Error { error });
            }
        }
        ClientFrame::TaskInput { task_id, content } => {
            match state.engine.send_input(&task_id, &content).await {
                Ok(delivered) => {
                    if !delivered {
                        tracing::debug!(%task_id, "input not delivered");
                    }
                }
                Err(error) => send(tx, ServerFrame::Error { error }),
            }
        }
        ClientFrame::TaskHistory { task_id, since_seq } => {
            follow_execution(state, tx, &task_id, since_seq.unwrap_or(0));
        }
        ClientFrame::KanbanRequestSync => {
            send(tx, ServerFrame::KanbanSync { board: state.engine.tasks().board() });
        }
    }
}

/// Stream an execution's events (replay + live) to this client.
fn follow_execution(
    state: &AppState,
    tx: &mpsc::Sender<ServerFrame>,
    task_id: &vk_core::TaskId,
    since_seq: u64,
) {
    match state.engine.subscribe(task_id, since_seq) {
        Ok(mut events) => {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if tx.send(ServerFrame::ExecutionEvent { event }).await.is_err() {
                        break;
                    }
                }
            });
        }
        Err(error) => send(tx, ServerFrame::Error { error }),
    }
}

/// Non-blocking send; the client loses frames rather than blocking us.
fn send(tx: &mpsc::Sender<ServerFrame>, frame: ServerFrame) {
    if tx.try_send(frame).is_err() {
        tracing::debug!("client outbound buffer full; dropping frame");
    }
}
