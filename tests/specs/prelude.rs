// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for the integration specs.

use std::sync::Arc;
use std::time::Duration;
use vk_adapters::{AdapterRegistry, FakeAdapter};
use vk_core::{
    AgentType, ExecutionEvent, FakeClock, Host, HostCapabilities, Task, TaskConfig, TaskId,
};
use vk_engine::{
    EngineDeps, ExecuteRequest, ExecutionEngine, FakeWorktrees, HostRegistry, LocalRunner,
    SubscriptionBus, TaskStore,
};
use vk_storage::{DataLayout, EventLog, RunStore, TaskSnapshot};

pub struct World {
    pub dir: tempfile::TempDir,
    pub engine: Arc<ExecutionEngine<FakeClock>>,
    pub adapter: FakeAdapter,
    pub hosts: Arc<HostRegistry<FakeClock>>,
    pub local_host: Option<Host>,
}

/// A world with one registered local host of capacity 2.
pub fn world(adapter: FakeAdapter) -> World {
    world_with(adapter, Some(2))
}

/// `host_capacity: None` leaves the registry empty.
pub fn world_with(adapter: FakeAdapter, host_capacity: Option<usize>) -> World {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    let clock = FakeClock::new();

    let log = Arc::new(EventLog::new(layout.clone()));
    let runs = Arc::new(RunStore::new(layout.clone()));
    let bus = Arc::new(SubscriptionBus::new(log.clone()));
    let tasks = TaskStore::load(TaskSnapshot::new(layout.clone()), clock.clone()).unwrap();
    let hosts = Arc::new(HostRegistry::new(clock.clone()));

    let engine = ExecutionEngine::new(
        EngineDeps { tasks, hosts: hosts.clone(), log, runs, bus },
        clock.clone(),
    );

    let worktrees = Arc::new(FakeWorktrees::new(dir.path().join("worktrees")));
    let local_host = host_capacity.map(|capacity| {
        let host = hosts.register(
            "local",
            HostCapabilities {
                supported_agents: vec![AgentType::Opencode, AgentType::ClaudeCode],
                max_concurrent: capacity,
                cwd: dir.path().join("repo"),
                labels: Default::default(),
            },
        );
        let runner = Arc::new(LocalRunner::new(
            worktrees.clone(),
            AdapterRegistry::uniform(Arc::new(adapter.clone())),
        ));
        engine.register_runner(host.host_id, runner);
        host
    });

    World { dir, engine, adapter, hosts, local_host }
}

/// An adapter that emits one message, then completes successfully.
pub fn completing_adapter() -> FakeAdapter {
    FakeAdapter::scripted(vec![
        vk_adapters::AdapterEvent::Agent(vk_core::AgentEvent::Message {
            content: "working".into(),
        }),
        vk_adapters::AdapterEvent::Agent(vk_core::AgentEvent::Completed {
            success: true,
            summary: None,
        }),
    ])
}

impl World {
    pub fn create_task(&self, title: &str, prompt: &str) -> Task {
        self.engine
            .create_task(
                TaskConfig::builder(title)
                    .description(prompt)
                    .agent_type(AgentType::Opencode)
                    .build(),
            )
            .unwrap()
    }

    /// Execute and collect the full timeline.
    pub async fn run_to_end(&self, task_id: &TaskId) -> Vec<ExecutionEvent> {
        self.engine.start_execution(task_id, ExecuteRequest::default()).unwrap();
        self.collect(task_id, 0).await
    }

    /// Collect a subscription until the stream ends.
    pub async fn collect(&self, task_id: &TaskId, since_seq: u64) -> Vec<ExecutionEvent> {
        let mut rx = self.engine.subscribe(task_id, since_seq).unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    pub async fn wait_until(&self, mut cond: impl FnMut(&World) -> bool) {
        for _ in 0..500 {
            if cond(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }

    pub fn task(&self, task_id: &TaskId) -> Task {
        self.engine.tasks().get(task_id).unwrap()
    }
}
