// crates/signet-cli/tests/serve_command.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests for the CLI safety checks.
// Purpose: Ensure non-loopback binds fail closed before server startup.
// Dependencies: signet binary
// ============================================================================
//! ## Overview
//! Validates that the CLI refuses to bind the issuer to non-loopback
//! addresses without the explicit environment opt-in, and that the
//! validate-config command accepts and rejects the right files.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn signet_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_signet"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies non-loopback binds are rejected before server startup.
#[test]
fn serve_rejects_non_loopback_bind() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("signet.toml");
    let config = r#"
[server]
bind = "0.0.0.0:9876"
issuer = "http://localhost:9876"
"#;
    fs::write(&config_path, config.trim()).expect("write config");

    let output = Command::new(signet_bin())
        .args(["serve", "--config", config_path.to_string_lossy().as_ref()])
        .env_remove("SIGNET_ALLOW_NON_LOOPBACK")
        .output()
        .expect("run signet serve");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("non-loopback"));
}

/// Verifies validate-config accepts a minimal valid file.
#[test]
fn validate_config_accepts_valid_file() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("signet.toml");
    fs::write(&config_path, "[server]\nissuer = \"http://localhost:9876\"\n")
        .expect("write config");
    let output = Command::new(signet_bin())
        .args(["validate-config", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("run signet validate-config");
    assert!(output.status.success());
}

/// Verifies validate-config rejects out-of-bounds values.
#[test]
fn validate_config_rejects_invalid_file() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("signet.toml");
    fs::write(
        &config_path,
        "[server]\nissuer = \"http://localhost:9876\"\n[token]\ncode_ttl_seconds = 9000\n",
    )
    .expect("write config");
    let output = Command::new(signet_bin())
        .args(["validate-config", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("run signet validate-config");
    assert!(!output.status.success());
}
