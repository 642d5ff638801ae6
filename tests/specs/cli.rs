// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary smoke specs: flag parsing and exit codes.

use assert_cmd::Command;

fn vkd() -> Command {
    let mut cmd = Command::cargo_bin("vkd").unwrap();
    // Keep the binary away from the user's real state directory.
    let dir = tempfile::tempdir().unwrap();
    cmd.env("VK_DATA_DIR", dir.path());
    cmd.env("RUST_LOG", "error");
    // Leak the tempdir so the path stays valid for the command's lifetime.
    std::mem::forget(dir);
    cmd
}

#[test]
fn help_exits_zero() {
    vkd().arg("--help").assert().success();
}

#[test]
fn version_exits_zero() {
    vkd().arg("--version").assert().success();
}

#[test]
fn invalid_listen_addr_is_a_configuration_error() {
    // Exit code 2: configuration error.
    vkd()
        .arg("serve")
        .env("VK_LISTEN_ADDR", "definitely-not-an-address")
        .assert()
        .code(2);
}

#[test]
fn unknown_agent_list_is_a_configuration_error() {
    vkd()
        .arg("serve")
        .env("VK_SUPPORTED_AGENTS", "opencode,teleporter")
        .assert()
        .code(2);
}

#[test]
fn unknown_subcommand_is_rejected() {
    vkd().arg("frobnicate").assert().failure();
}
