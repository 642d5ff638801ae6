// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-memory adapter for engine and gateway tests.

use crate::agent::{
    AdapterConfig, AdapterControl, AdapterError, AdapterEvent, AdapterHandle, AgentAdapter,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// What the fake records about how it was driven.
#[derive(Default)]
pub struct FakeRecorder {
    pub prompts: Mutex<Vec<(String, Option<String>)>>,
    pub inputs: Mutex<Vec<String>>,
    pub aborts: AtomicUsize,
    pub starts: AtomicUsize,
}

impl FakeRecorder {
    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::Acquire)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::Acquire)
    }

    pub fn prompt_texts(&self) -> Vec<String> {
        self.prompts.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn input_texts(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

/// An adapter that plays a fixed script once the prompt is submitted.
///
/// `pause_after(n)` holds the stream open after `n` events until abort (or
/// `release()`), which is how cancel-mid-run scenarios are exercised.
#[derive(Clone)]
pub struct FakeAdapter {
    script: Arc<Vec<AdapterEvent>>,
    pause_after: Option<usize>,
    hold_open: bool,
    fail_start: Option<String>,
    not_ready: bool,
    refuse_input: bool,
    pub recorder: Arc<FakeRecorder>,
    /// One-shot latch unparking a paused or held-open script.
    release: Arc<watch::Sender<bool>>,
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self::scripted(Vec::new())
    }
}

impl FakeAdapter {
    pub fn scripted(script: Vec<AdapterEvent>) -> Self {
        Self {
            script: Arc::new(script),
            pause_after: None,
            hold_open: false,
            fail_start: None,
            not_ready: false,
            refuse_input: false,
            recorder: Arc::new(FakeRecorder::default()),
            release: Arc::new(watch::channel(false).0),
        }
    }

    /// Fail `start` with the given reason.
    pub fn failing_start(reason: impl Into<String>) -> Self {
        let mut fake = Self::scripted(Vec::new());
        fake.fail_start = Some(reason.into());
        fake
    }

    /// Hand out handles that reject prompts as not ready.
    pub fn never_ready(mut self) -> Self {
        self.not_ready = true;
        self
    }

    /// Park the stream after `n` events until abort/release.
    pub fn pause_after(mut self, n: usize) -> Self {
        self.pause_after = Some(n);
        self
    }

    /// Keep the stream open after the script until abort/release.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Make `send_input` report failure.
    pub fn refuse_input(mut self) -> Self {
        self.refuse_input = true;
        self
    }

    /// Unpark a paused or held-open stream without aborting.
    pub fn release(&self) {
        let _ = self.release.send(true);
    }
}

struct FakeControl {
    script: Arc<Vec<AdapterEvent>>,
    pause_after: Option<usize>,
    hold_open: bool,
    refuse_input: bool,
    recorder: Arc<FakeRecorder>,
    release: Arc<watch::Sender<bool>>,
    events_tx: Mutex<Option<mpsc::Sender<AdapterEvent>>>,
    abort_token: CancellationToken,
    aborted_once: AtomicBool,
}

#[async_trait]
impl AdapterControl for FakeControl {
    async fn submit_prompt(&self, prompt: &str, model: Option<&str>) -> Result<(), AdapterError> {
        self.recorder.prompts.lock().push((prompt.to_string(), model.map(str::to_string)));

        let Some(tx) = self.events_tx.lock().take() else {
            return Ok(());
        };
        let script = self.script.clone();
        let pause_after = self.pause_after;
        let hold_open = self.hold_open;
        let mut release = self.release.subscribe();
        let token = self.abort_token.clone();
        tokio::spawn(async move {
            for (i, event) in script.iter().enumerate() {
                if pause_after == Some(i) && park(&mut release, &token).await {
                    return;
                }
                if token.is_cancelled() {
                    return;
                }
                if tx.send(event.clone()).await.is_err() {
                    return;
                }
            }
            if hold_open {
                park(&mut release, &token).await;
            }
            // tx drops here, closing the stream.
        });
        Ok(())
    }

    async fn send_input(&self, text: &str) -> bool {
        self.recorder.inputs.lock().push(text.to_string());
        !self.refuse_input
    }

    async fn abort(&self) {
        if !self.aborted_once.swap(true, Ordering::AcqRel) {
            self.recorder.aborts.fetch_add(1, Ordering::AcqRel);
        }
        // Drop the sender if the prompt never arrived, then stop the script.
        self.events_tx.lock().take();
        self.abort_token.cancel();
    }
}

/// Wait for the release latch or an abort. Returns true when aborted.
async fn park(release: &mut watch::Receiver<bool>, token: &CancellationToken) -> bool {
    loop {
        if *release.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = token.cancelled() => return true,
            changed = release.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

#[async_trait]
impl AgentAdapter for FakeAdapter {
    async fn start(&self, config: AdapterConfig) -> Result<AdapterHandle, AdapterError> {
        self.recorder.starts.fetch_add(1, Ordering::AcqRel);
        if let Some(reason) = &self.fail_start {
            return Err(AdapterError::StartFailed(reason.clone()));
        }

        let (tx, rx) = mpsc::channel(vk_core::limits::SUBSCRIBER_BUFFER);
        let control = Arc::new(FakeControl {
            script: self.script.clone(),
            pause_after: self.pause_after,
            hold_open: self.hold_open,
            refuse_input: self.refuse_input,
            recorder: self.recorder.clone(),
            release: self.release.clone(),
            events_tx: Mutex::new(Some(tx)),
            abort_token: CancellationToken::new(),
            aborted_once: AtomicBool::new(false),
        });
        let ready = Arc::new(AtomicBool::new(!self.not_ready));
        Ok(AdapterHandle::new(&config, rx, control, ready))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
