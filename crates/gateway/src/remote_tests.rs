// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use vk_core::AgentEvent;
use vk_core::AgentType;

struct Fixture {
    channel: Arc<HostChannel>,
    runner: RemoteRunner,
    outbound_rx: mpsc::Receiver<GatewayFrame>,
}

fn fixture() -> Fixture {
    let (tx, rx) = mpsc::channel(16);
    let channel = HostChannel::new(tx);
    let runner = RemoteRunner::new(channel.clone());
    Fixture { channel, runner, outbound_rx: rx }
}

#[tokio::test]
async fn create_worktree_round_trips_over_the_channel() {
    let mut fx = fixture();
    let execution_id = ExecutionId::new();

    let create = fx.runner.create_worktree(&execution_id, "main");
    tokio::pin!(create);

    // The frame goes out; answer it like a host would.
    let frame = tokio::select! {
        frame = fx.outbound_rx.recv() => frame.unwrap(),
        _ = &mut create => panic!("create resolved before the host replied"),
    };
    let request_id = match frame {
        GatewayFrame::CreateWorktree { request_id, base_branch, .. } => {
            assert_eq!(base_branch, "main");
            request_id
        }
        other => panic!("unexpected frame: {other:?}"),
    };

    let worktree =
        Worktree::new(std::path::PathBuf::from("/srv/worktrees/x"), "main", execution_id);
    fx.channel
        .route_frame(HostFrame::WorktreeCreated { request_id, worktree: worktree.clone() });

    assert_eq!(create.await.unwrap(), worktree);
}

#[tokio::test]
async fn request_failed_reply_surfaces_the_message() {
    let mut fx = fixture();
    let execution_id = ExecutionId::new();

    let create = fx.runner.create_worktree(&execution_id, "gone");
    tokio::pin!(create);

    let frame = tokio::select! {
        frame = fx.outbound_rx.recv() => frame.unwrap(),
        _ = &mut create => panic!("resolved early"),
    };
    let request_id = match frame {
        GatewayFrame::CreateWorktree { request_id, .. } => request_id,
        other => panic!("unexpected frame: {other:?}"),
    };
    fx.channel.route_frame(HostFrame::RequestFailed {
        request_id,
        message: "base branch missing: gone".into(),
    });

    let err = create.await.unwrap_err();
    assert!(err.to_string().contains("base branch missing"));
}

#[tokio::test]
async fn start_agent_routes_relayed_events_into_the_session() {
    let mut fx = fixture();
    let execution_id = ExecutionId::new();
    let request = StartAgent {
        execution_id,
        agent_type: AgentType::Opencode,
        working_dir: std::path::PathBuf::from("/srv/worktrees/x"),
        prompt: "do it".into(),
        model: None,
        idle_timeout: std::time::Duration::from_secs(60),
    };

    let start = fx.runner.start_agent(request);
    tokio::pin!(start);
    let frame = tokio::select! {
        frame = fx.outbound_rx.recv() => frame.unwrap(),
        _ = &mut start => panic!("resolved early"),
    };
    let request_id = match frame {
        GatewayFrame::StartAgent { request_id, prompt, .. } => {
            assert_eq!(prompt, "do it");
            request_id
        }
        other => panic!("unexpected frame: {other:?}"),
    };
    fx.channel.route_frame(HostFrame::AgentStarted { request_id });
    let mut session = start.await.unwrap();

    fx.channel.route_frame(HostFrame::AgentEvent {
        execution_id,
        event: AdapterEvent::Agent(AgentEvent::Message { content: "hi".into() }),
    });
    let event = session.events.recv().await.unwrap();
    assert_eq!(event, AdapterEvent::Agent(AgentEvent::Message { content: "hi".into() }));

    // Stream closes when the host reports the agent finished.
    fx.channel.route_frame(HostFrame::AgentFinished { execution_id });
    assert!(session.events.recv().await.is_none());
}

#[tokio::test]
async fn abort_sends_a_plain_frame() {
    let mut fx = fixture();
    let execution_id = ExecutionId::new();
    let control = RemoteControl { channel: fx.channel.clone(), execution_id };

    control.abort().await;
    match fx.outbound_rx.recv().await.unwrap() {
        GatewayFrame::Abort { execution_id: got } => assert_eq!(got, execution_id),
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test]
async fn send_input_reports_delivery() {
    let mut fx = fixture();
    let execution_id = ExecutionId::new();
    let control = RemoteControl { channel: fx.channel.clone(), execution_id };

    let send = control.send_input("more");
    tokio::pin!(send);
    let frame = tokio::select! {
        frame = fx.outbound_rx.recv() => frame.unwrap(),
        _ = &mut send => panic!("resolved early"),
    };
    let request_id = match frame {
        GatewayFrame::SendInput { request_id, text, .. } => {
            assert_eq!(text, "more");
            request_id
        }
        other => panic!("unexpected frame: {other:?}"),
    };
    fx.channel.route_frame(HostFrame::InputResult { request_id, delivered: true });
    assert!(send.await);
}

#[tokio::test]
async fn disconnect_fails_pending_requests() {
    let mut fx = fixture();
    let execution_id = ExecutionId::new();

    let create = fx.runner.create_worktree(&execution_id, "main");
    tokio::pin!(create);
    let _ = tokio::select! {
        frame = fx.outbound_rx.recv() => frame.unwrap(),
        _ = &mut create => panic!("resolved early"),
    };

    fx.channel.disconnected();
    let err = create.await.unwrap_err();
    assert!(err.to_string().contains("control channel closed"));
}
