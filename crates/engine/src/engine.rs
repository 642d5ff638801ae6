// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution engine: one state-machine worker per active execution.
//!
//! The synchronous part of `start_execution` validates, reserves a host,
//! appends the first timeline event and registers the execution; everything
//! after that happens on a spawned worker that drives the run to a terminal
//! state, normalising adapter events into the log and the subscription bus
//! as it goes.

use crate::bus::SubscriptionBus;
use crate::hosts::HostRegistry;
use crate::runner::{HostRunner, SessionControl, StartAgent};
use crate::tasks::TaskStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use vk_adapters::AdapterEvent;
use vk_core::limits::{ABORT_GRACE, ADAPTER_IDLE_TIMEOUT, WORKTREE_CREATE_TIMEOUT};
use vk_core::{
    AgentEvent, AgentType, Clock, EventKind, Execution, ExecutionEvent, ExecutionId,
    ExecutionState, GatewayError, HostId, OutputStream, Task, TaskConfig, TaskId,
};
use vk_storage::{EventFilter, EventLog, EventPage, RunRecord, RunStore, RunSummary};

/// Overrides for one `start_execution` call; unset fields fall back to the
/// task's stored settings.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub agent_type: Option<AgentType>,
    pub base_branch: Option<String>,
    pub model: Option<String>,
    /// Explicit host; auto-selection otherwise.
    pub host: Option<HostId>,
}

/// Shared collaborators of the engine.
pub struct EngineDeps<C: Clock> {
    pub tasks: Arc<TaskStore<C>>,
    pub hosts: Arc<HostRegistry<C>>,
    pub log: Arc<EventLog>,
    pub runs: Arc<RunStore>,
    pub bus: Arc<SubscriptionBus>,
}

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Destroy worktrees as soon as a run settles.
    pub auto_cleanup: bool,
    /// Adapter idle window before a run is failed as stalled.
    pub idle_timeout: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { auto_cleanup: false, idle_timeout: ADAPTER_IDLE_TIMEOUT }
    }
}

struct ActiveExecution {
    execution_id: ExecutionId,
    cancel: CancellationToken,
    /// Set once the agent session is up; used by `send_input`.
    control: Arc<Mutex<Option<Arc<dyn SessionControl>>>>,
}

pub struct ExecutionEngine<C: Clock> {
    clock: C,
    config: EngineConfig,
    tasks: Arc<TaskStore<C>>,
    hosts: Arc<HostRegistry<C>>,
    log: Arc<EventLog>,
    runs: Arc<RunStore>,
    bus: Arc<SubscriptionBus>,
    runners: Mutex<HashMap<HostId, Arc<dyn HostRunner>>>,
    active: Mutex<HashMap<TaskId, Arc<ActiveExecution>>>,
    /// Cleared when the event log fails; the gateway then refuses new
    /// executions until recovery.
    accepting: AtomicBool,
    /// Handle to ourselves for spawning workers.
    self_ref: std::sync::Weak<Self>,
}

impl<C: Clock> ExecutionEngine<C> {
    pub fn new(deps: EngineDeps<C>, clock: C) -> Arc<Self> {
        Self::with_config(deps, EngineConfig::default(), clock)
    }

    pub fn with_config(deps: EngineDeps<C>, config: EngineConfig, clock: C) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            clock,
            config,
            tasks: deps.tasks,
            hosts: deps.hosts,
            log: deps.log,
            runs: deps.runs,
            bus: deps.bus,
            runners: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            self_ref: self_ref.clone(),
        })
    }

    /// Attach the runner that executes work for a host.
    pub fn register_runner(&self, host_id: HostId, runner: Arc<dyn HostRunner>) {
        self.runners.lock().insert(host_id, runner);
    }

    pub fn remove_runner(&self, host_id: &HostId) {
        self.runners.lock().remove(host_id);
    }

    fn runner_for(&self, host_id: &HostId) -> Result<Arc<dyn HostRunner>, GatewayError> {
        self.runners
            .lock()
            .get(host_id)
            .cloned()
            .ok_or_else(|| GatewayError::precondition(format!("host {host_id} has no runner")))
    }

    /// False once the event log has failed; REST maps this to 503.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn tasks(&self) -> &Arc<TaskStore<C>> {
        &self.tasks
    }

    pub fn hosts(&self) -> &Arc<HostRegistry<C>> {
        &self.hosts
    }

    pub fn bus(&self) -> &Arc<SubscriptionBus> {
        &self.bus
    }

    pub fn create_task(&self, config: TaskConfig) -> Result<Task, GatewayError> {
        self.tasks.create_task(config)
    }

    /// Start executing a task. Synchronous validation and host reservation;
    /// further progress is asynchronous.
    pub fn start_execution(
        &self,
        task_id: &TaskId,
        request: ExecuteRequest,
    ) -> Result<ExecutionId, GatewayError> {
        if !self.is_accepting() {
            return Err(GatewayError::unavailable("event log unavailable"));
        }
        let Some(engine) = self.self_ref.upgrade() else {
            return Err(GatewayError::unavailable("engine is shutting down"));
        };
        let task = self.tasks.require(task_id)?;

        // Single-leader: the active map's lock arbitrates concurrent starts.
        let mut active = self.active.lock();
        if active.contains_key(task_id) || task.is_executing() {
            return Err(GatewayError::already_executing(task_id));
        }

        let agent_type = request.agent_type.unwrap_or(task.agent_type);
        let base_branch =
            request.base_branch.clone().unwrap_or_else(|| task.base_branch.clone());
        let model = request.model.clone().or_else(|| task.model.clone());

        // No execution state exists until a host is secured.
        let host_id = self.hosts.select(agent_type, request.host)?;
        let runner = self.runner_for(&host_id)?;
        self.hosts.reserve(&host_id, task_id)?;

        let execution = Execution::new(*task_id, host_id, &self.clock);
        let execution_id = execution.execution_id;
        let mut record =
            RunRecord::new(execution, agent_type, task.prompt_preview().to_string());

        if let Err(e) = self.emit(
            &mut record,
            EventKind::StatusChanged { old_state: None, new_state: ExecutionState::Initializing },
        ) {
            self.hosts.release(&host_id, task_id);
            return Err(e);
        }
        if let Err(e) = self.runs.save(&record) {
            self.hosts.release(&host_id, task_id);
            return Err(GatewayError::io(e.to_string()));
        }
        if let Err(e) = self.tasks.begin_execution(task_id, execution_id) {
            self.hosts.release(&host_id, task_id);
            return Err(e);
        }

        let handle = Arc::new(ActiveExecution {
            execution_id,
            cancel: CancellationToken::new(),
            control: Arc::new(Mutex::new(None)),
        });
        active.insert(*task_id, handle.clone());
        drop(active);

        let worker = WorkerCtx {
            record,
            prompt: task.prompt().to_string(),
            agent_type,
            base_branch,
            model,
            runner,
            handle,
        };
        let span = tracing::info_span!("execution", %task_id, %execution_id);
        tokio::spawn(
            async move {
                engine.run_execution(worker).await;
            }
            .instrument(span),
        );
        Ok(execution_id)
    }

    /// Cancel every active execution (graceful shutdown drain).
    pub fn abort_all(&self) {
        for active in self.active.lock().values() {
            active.cancel.cancel();
        }
    }

    /// Number of executions still in flight.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Request cancellation of the current execution. Idempotent.
    pub fn abort_execution(&self, task_id: &TaskId) -> Result<(), GatewayError> {
        self.tasks.require(task_id)?;
        if let Some(active) = self.active.lock().get(task_id) {
            tracing::info!(%task_id, execution_id = %active.execution_id, "abort requested");
            active.cancel.cancel();
        }
        // Already-terminal (or never-started) tasks: nothing to do.
        Ok(())
    }

    /// Best-effort forward of runtime input to the active adapter.
    pub async fn send_input(&self, task_id: &TaskId, text: &str) -> Result<bool, GatewayError> {
        self.tasks.require(task_id)?;
        let control = {
            let active = self.active.lock();
            match active.get(task_id) {
                Some(handle) => handle.control.lock().clone(),
                None => None,
            }
        };
        match control {
            Some(control) => Ok(control.send_input(text).await),
            None => Ok(false),
        }
    }

    /// Destroy the worktree of the latest (terminal) execution.
    ///
    /// No-op returning true when already cleaned.
    pub async fn cleanup_worktree(&self, task_id: &TaskId) -> Result<bool, GatewayError> {
        self.tasks.require(task_id)?;
        if self.active.lock().contains_key(task_id) {
            return Err(GatewayError::precondition(format!(
                "task {task_id} execution is not terminal"
            )));
        }

        let Some(summary) = self.runs.list_runs(task_id).map_err(io_err)?.into_iter().next()
        else {
            return Err(GatewayError::precondition(format!("task {task_id} has no runs")));
        };
        let Some(mut record) =
            self.runs.load(task_id, &summary.execution_id).map_err(io_err)?
        else {
            return Err(GatewayError::not_found(format!("run {} not found", summary.execution_id)));
        };
        if !record.execution.state.is_settled() {
            return Err(GatewayError::precondition(format!(
                "execution {} is not terminal",
                record.execution.execution_id
            )));
        }
        if record.worktree_cleaned {
            return Ok(true);
        }

        let runner = self.runner_for(&record.execution.host_id)?;
        runner
            .destroy_worktree(&record.execution.execution_id)
            .await
            .map_err(|e| GatewayError::io(e.to_string()))?;

        record.worktree_cleaned = true;
        if record.execution.state.is_terminal() {
            let _ = record.execution.transition(ExecutionState::CleaningUp, self.clock.epoch_ms());
        }
        self.runs.save(&record).map_err(io_err)?;
        tracing::info!(%task_id, execution_id = %record.execution.execution_id, "worktree cleaned up");
        Ok(true)
    }

    /// Current (or latest) execution snapshot for a task.
    pub fn execution_status(&self, task_id: &TaskId) -> Result<Option<Execution>, GatewayError> {
        self.tasks.require(task_id)?;
        let execution_id = {
            let active = self.active.lock();
            active.get(task_id).map(|a| a.execution_id)
        };
        let execution_id = match execution_id {
            Some(id) => Some(id),
            None => self
                .runs
                .list_runs(task_id)
                .map_err(io_err)?
                .into_iter()
                .next()
                .map(|s| s.execution_id),
        };
        match execution_id {
            Some(id) => {
                Ok(self.runs.load(task_id, &id).map_err(io_err)?.map(|r| r.execution))
            }
            None => Ok(None),
        }
    }

    pub fn list_runs(&self, task_id: &TaskId) -> Result<Vec<RunSummary>, GatewayError> {
        self.tasks.require(task_id)?;
        self.runs.list_runs(task_id).map_err(io_err)
    }

    pub fn read_events(
        &self,
        task_id: &TaskId,
        execution_id: &ExecutionId,
        filter: &EventFilter,
        offset: usize,
        limit: usize,
    ) -> Result<EventPage, GatewayError> {
        self.tasks.require(task_id)?;
        self.log.read(task_id, execution_id, filter, offset, limit).map_err(io_err)
    }

    /// Subscribe to a task's current (or latest) execution from `since_seq`.
    pub fn subscribe(
        &self,
        task_id: &TaskId,
        since_seq: u64,
    ) -> Result<mpsc::Receiver<ExecutionEvent>, GatewayError> {
        let task = self.tasks.require(task_id)?;
        let execution_id = match task.current_execution_id {
            Some(id) => id,
            None => self
                .runs
                .list_runs(task_id)
                .map_err(io_err)?
                .into_iter()
                .next()
                .map(|s| s.execution_id)
                .ok_or_else(|| {
                    GatewayError::not_found(format!("task {task_id} has no executions"))
                })?,
        };
        Ok(self.bus.subscribe(*task_id, execution_id, since_seq))
    }

    // --- worker ---

    async fn run_execution(self: Arc<Self>, mut ctx: WorkerCtx) {
        let outcome = self.drive(&mut ctx).await;
        self.finish(&mut ctx, outcome).await;
    }

    /// Run the state machine until a terminal outcome is decided.
    async fn drive(&self, ctx: &mut WorkerCtx) -> Outcome {
        let execution_id = ctx.record.execution.execution_id;
        let cancel = ctx.handle.cancel.clone();

        // creating_worktree
        if self
            .transition_with_event(&mut ctx.record, ExecutionState::CreatingWorktree)
            .is_err()
        {
            return Outcome::lost();
        }

        let worktree = {
            let runner = ctx.runner.clone();
            let base_branch = ctx.base_branch.clone();
            let create = runner.create_worktree(&execution_id, &base_branch);
            tokio::pin!(create);
            tokio::select! {
                result = &mut create => match result {
                    Ok(worktree) => worktree,
                    Err(e) => return Outcome::failed(format!("worktree creation failed: {e}")),
                },
                _ = cancel.cancelled() => {
                    // Let the creation finish or fail (bounded), then discard
                    // whatever it produced.
                    if let Ok(Ok(_)) =
                        tokio::time::timeout(WORKTREE_CREATE_TIMEOUT, &mut create).await
                    {
                        let _ = runner.destroy_worktree(&execution_id).await;
                    }
                    return Outcome::cancelled();
                }
            }
        };

        ctx.record
            .execution
            .set_worktree(worktree.path.clone(), worktree.branch_name.clone());
        if self
            .emit(
                &mut ctx.record,
                EventKind::SessionStarted {
                    worktree_path: worktree.path.display().to_string(),
                    branch_name: worktree.branch_name.clone(),
                },
            )
            .is_err()
        {
            return Outcome::lost();
        }
        // starting (recorded on the execution; session_started carries it
        // on the timeline)
        let now = self.clock.epoch_ms();
        let _ = ctx.record.execution.transition(ExecutionState::Starting, now);
        let _ = self.runs.save(&ctx.record);

        let start = StartAgent {
            execution_id,
            agent_type: ctx.agent_type,
            working_dir: worktree.path.clone(),
            prompt: ctx.prompt.clone(),
            model: ctx.model.clone(),
            idle_timeout: self.config.idle_timeout,
        };
        let session = tokio::select! {
            result = ctx.runner.start_agent(start) => match result {
                Ok(session) => session,
                Err(e) => return Outcome::failed(e.to_string()),
            },
            _ = cancel.cancelled() => return Outcome::cancelled(),
        };
        *ctx.handle.control.lock() = Some(session.control.clone());

        // running
        if self.transition_with_event(&mut ctx.record, ExecutionState::Running).is_err() {
            return Outcome::lost();
        }
        let _ = self.runs.save(&ctx.record);

        self.consume_events(ctx, session.events, session.control, cancel).await
    }

    /// Normalise, append, and publish the agent's events until the run is
    /// resolved.
    async fn consume_events(
        &self,
        ctx: &mut WorkerCtx,
        mut events: mpsc::Receiver<AdapterEvent>,
        control: Arc<dyn SessionControl>,
        cancel: CancellationToken,
    ) -> Outcome {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    control.abort().await;
                    self.drain_after_abort(ctx, &mut events).await;
                    return Outcome::cancelled();
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                return Outcome::failed("agent ended without completion".to_string());
            };

            let resolution = resolution_of(&event);
            if self.emit(&mut ctx.record, normalize(event)).is_err() {
                return Outcome::lost();
            }

            match resolution {
                Some(Resolution::Completed) => {
                    self.drain_after_completion(ctx, &mut events).await;
                    return Outcome::completed();
                }
                Some(Resolution::Failed(reason)) => return Outcome::failed(reason),
                None => {}
            }
        }
    }

    /// After abort: append whatever the adapter still emits, bounded by the
    /// grace window.
    async fn drain_after_abort(
        &self,
        ctx: &mut WorkerCtx,
        events: &mut mpsc::Receiver<AdapterEvent>,
    ) {
        loop {
            match tokio::time::timeout(ABORT_GRACE, events.recv()).await {
                Ok(Some(event)) => {
                    if self.emit(&mut ctx.record, normalize(event)).is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(_) => {
                    tracing::warn!("adapter stream did not terminate within abort grace");
                    return;
                }
            }
        }
    }

    /// The run already completed; a trailing crash is logged as raw output
    /// and ignored.
    async fn drain_after_completion(
        &self,
        ctx: &mut WorkerCtx,
        events: &mut mpsc::Receiver<AdapterEvent>,
    ) {
        while let Ok(event) = events.try_recv() {
            let kind = match event {
                AdapterEvent::Agent(AgentEvent::Error { message, .. }) => EventKind::AgentEvent {
                    event: AgentEvent::RawOutput { stream: OutputStream::Stderr, content: message },
                },
                other => normalize(other),
            };
            if self.emit(&mut ctx.record, kind).is_err() {
                return;
            }
        }
    }

    /// Settle the run: final events, host release, kanban projection.
    async fn finish(&self, ctx: &mut WorkerCtx, outcome: Outcome) {
        let record = &mut ctx.record;
        let task_id = record.execution.task_id;
        let execution_id = record.execution.execution_id;
        let now = self.clock.epoch_ms();
        let old_state = record.execution.state;
        let state = outcome.state;

        if record.execution.transition(state, now).is_err() {
            // Should not happen; force the terminal state rather than leave
            // the run dangling.
            record.execution.state = state;
            record.execution.final_state = Some(state);
            record.execution.ended_at_ms = Some(now);
        }
        if let Some(error) = outcome.error {
            record.execution.error = Some(error);
        }

        // Engine-decided endings get a status_changed marker; an agent's own
        // completion is already on the timeline.
        if state != ExecutionState::Completed && !outcome.log_lost {
            let _ = self.emit(
                record,
                EventKind::StatusChanged { old_state: Some(old_state), new_state: state },
            );
        }
        if !outcome.log_lost {
            let duration_ms = record.execution.duration_ms(now);
            let _ = self.emit(
                record,
                EventKind::SessionEnded { final_state: state, duration_ms },
            );
        }
        if let Err(e) = self.runs.save(record) {
            tracing::error!(error = %e, %execution_id, "failed to persist run record");
        }

        self.hosts.release(&record.execution.host_id, &task_id);
        if let Err(e) = self.tasks.settle_execution(&task_id, &execution_id, state) {
            tracing::error!(error = %e, %task_id, "failed to settle task");
        }
        self.bus.finish(&execution_id);
        self.active.lock().remove(&task_id);
        tracing::info!(%task_id, %execution_id, outcome = %state, "execution settled");

        if self.config.auto_cleanup && record.execution.worktree_path.is_some() {
            if let Ok(runner) = self.runner_for(&record.execution.host_id) {
                if runner.destroy_worktree(&execution_id).await.is_ok() {
                    record.worktree_cleaned = true;
                    let _ =
                        record.execution.transition(ExecutionState::CleaningUp, self.clock.epoch_ms());
                    let _ = self.runs.save(record);
                }
            }
        }
    }

    /// Transition and append the matching `status_changed` event.
    fn transition_with_event(
        &self,
        record: &mut RunRecord,
        to: ExecutionState,
    ) -> Result<(), GatewayError> {
        let old = record.execution.state;
        let now = self.clock.epoch_ms();
        record
            .execution
            .transition(to, now)
            .map_err(|e| GatewayError::precondition(e.to_string()))?;
        self.emit(record, EventKind::StatusChanged { old_state: Some(old), new_state: to })
    }

    /// Append one event to the log, fold it into the record, publish it.
    ///
    /// A storage failure here poisons the engine: it stops accepting new
    /// executions and the current run is treated as lost.
    fn emit(&self, record: &mut RunRecord, kind: EventKind) -> Result<(), GatewayError> {
        let mut event = ExecutionEvent::new(
            record.execution.execution_id,
            record.execution.task_id,
            self.clock.epoch_ms(),
            kind,
        );
        if let Err(e) = self.log.append(&mut event) {
            tracing::error!(error = %e, "event log append failed; refusing new executions");
            self.accepting.store(false, Ordering::Release);
            return Err(GatewayError::io(e.to_string()));
        }
        record.absorb(&event);
        self.bus.publish(&event);
        Ok(())
    }
}

struct WorkerCtx {
    record: RunRecord,
    prompt: String,
    agent_type: AgentType,
    base_branch: String,
    model: Option<String>,
    runner: Arc<dyn HostRunner>,
    handle: Arc<ActiveExecution>,
}

enum Resolution {
    Completed,
    Failed(String),
}

/// How a raw adapter event resolves the run, if at all.
fn resolution_of(event: &AdapterEvent) -> Option<Resolution> {
    match event {
        AdapterEvent::Agent(AgentEvent::Completed { success: true, .. }) => {
            Some(Resolution::Completed)
        }
        AdapterEvent::Agent(AgentEvent::Completed { success: false, .. }) => {
            Some(Resolution::Failed("agent reported failure".to_string()))
        }
        AdapterEvent::Agent(AgentEvent::Error { recoverable: false, message }) => {
            Some(Resolution::Failed(message.clone()))
        }
        _ => None,
    }
}

/// Adapter event → timeline entry.
fn normalize(event: AdapterEvent) -> EventKind {
    match event {
        AdapterEvent::Agent(event) => EventKind::AgentEvent { event },
        AdapterEvent::Progress { message, percentage } => {
            EventKind::Progress { message, percentage }
        }
    }
}

struct Outcome {
    state: ExecutionState,
    error: Option<String>,
    /// The event log is gone; skip the final appends.
    log_lost: bool,
}

impl Outcome {
    fn completed() -> Self {
        Self { state: ExecutionState::Completed, error: None, log_lost: false }
    }

    fn cancelled() -> Self {
        Self { state: ExecutionState::Cancelled, error: None, log_lost: false }
    }

    fn failed(reason: String) -> Self {
        Self { state: ExecutionState::Failed, error: Some(reason), log_lost: false }
    }

    fn lost() -> Self {
        Self {
            state: ExecutionState::Failed,
            error: Some("event log unavailable".to_string()),
            log_lost: true,
        }
    }
}

fn io_err(e: vk_storage::StorageError) -> GatewayError {
    GatewayError::io(e.to_string())
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
