// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vk-adapters: drivers for the external AI coding agents.
//!
//! One [`agent::AgentAdapter`] implementation per agent protocol family:
//! the OpenCode HTTP/SSE server ([`agent::OpencodeAdapter`]) and the
//! line-oriented CLIs ([`agent::CliAdapter`] for Claude Code, Codex and
//! Gemini CLI). The engine only sees the trait and the
//! [`agent::AdapterHandle`] it returns.

pub mod agent;
pub mod subprocess;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use agent::{
    AdapterConfig, AdapterError, AdapterEvent, AdapterHandle, AdapterRegistry, AgentAdapter,
    CliAdapter, OpencodeAdapter,
};
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAdapter, FakeRecorder};
