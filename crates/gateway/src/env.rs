// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the gateway.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use vk_core::AgentType;

/// Gateway version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve data directory: VK_DATA_DIR > XDG_STATE_HOME/vk > ~/.local/state/vk
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("VK_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("vk"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/vk"))
}

/// Listen address for HTTP and websocket endpoints.
///
/// `Err` carries the malformed value (a configuration error).
pub fn listen_addr() -> Result<SocketAddr, String> {
    let raw =
        std::env::var("VK_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".to_string());
    raw.parse().map_err(|_| format!("invalid VK_LISTEN_ADDR: {raw:?}"))
}

/// Worker URL advertised for the default agent runtime.
pub fn worker_url() -> String {
    std::env::var("VK_WORKER_URL").unwrap_or_else(|_| "http://localhost:4000".to_string())
}

/// Repository the built-in local host creates worktrees from.
pub fn repo_root() -> PathBuf {
    std::env::var("VK_REPO_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Display name of the built-in local host.
pub fn host_name() -> String {
    std::env::var("VK_HOST_NAME").unwrap_or_else(|_| "local".to_string())
}

/// Concurrency cap of the built-in local host.
pub fn max_concurrent() -> usize {
    std::env::var("VK_MAX_CONCURRENT").ok().and_then(|s| s.parse().ok()).unwrap_or(2)
}

/// Agents the built-in local host offers (comma-separated).
///
/// `Err` carries the unknown agent name (a configuration error).
pub fn supported_agents() -> Result<Vec<AgentType>, String> {
    let raw = match std::env::var("VK_SUPPORTED_AGENTS") {
        Ok(raw) => raw,
        Err(_) => {
            return Ok(vec![
                AgentType::Opencode,
                AgentType::ClaudeCode,
                AgentType::Codex,
                AgentType::GeminiCli,
            ]);
        }
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| AgentType::parse(s).ok_or_else(|| format!("unknown agent in VK_SUPPORTED_AGENTS: {s:?}")))
        .collect()
}

/// Host heartbeat interval override.
pub fn heartbeat_interval() -> Duration {
    std::env::var("VK_HEARTBEAT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(vk_core::limits::HOST_HEARTBEAT_INTERVAL)
}

/// Adapter idle timeout override.
pub fn idle_timeout() -> Duration {
    std::env::var("VK_IDLE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(vk_core::limits::ADAPTER_IDLE_TIMEOUT)
}

/// Feature flag for the out-of-core memory subsystem.
pub fn memory_enhanced() -> bool {
    flag("VK_MEMORY_ENHANCED")
}

/// Destroy worktrees as soon as a run settles.
pub fn auto_cleanup() -> bool {
    flag("VK_AUTO_CLEANUP")
}

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
