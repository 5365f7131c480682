//! CLI integration tests.
//!
//! Tests:
//! - Help and version output
//! - Unknown flags and invalid values exit with status 1
//! - An unreachable peer exits with status 1

use std::process::Command;

fn driver() -> Command {
    Command::new(env!("CARGO_BIN_EXE_amqp-driver"))
}

/// --help should list the driver options and exit 0.
#[test]
fn test_cli_help_output() {
    let output = driver().arg("--help").output().expect("failed to run");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--operation",
        "--address",
        "--max_message_length",
        "--flight_times_file_name",
        "--throttle",
        "--soak",
        "--log-level",
    ] {
        assert!(stdout.contains(flag), "help should mention {flag}");
    }
}

/// --version should show the version and exit 0.
#[test]
fn test_cli_version_output() {
    let output = driver().arg("--version").output().expect("failed to run");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "version output should contain version number: {}",
        stdout
    );
}

#[test]
fn test_unknown_flag_exits_one() {
    let output = driver()
        .args(["--address", "q1", "--no_such_flag"])
        .output()
        .expect("failed to run");
    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_missing_address_exits_one() {
    let output = driver().args(["--messages", "5"]).output().expect("failed to run");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_invalid_message_length_exits_one() {
    let output = driver()
        .args(["--address", "q1", "--messages", "5", "--max_message_length", "0"])
        .output()
        .expect("failed to run");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max_message_length"), "stderr: {stderr}");
}

#[test]
fn test_unreachable_peer_exits_one() {
    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
    let output = driver()
        .args(["--operation", "send", "--address", "q1", "--messages", "1"])
        .args(["--host", "127.0.0.1", "--port", "1"])
        .arg("--flight_times_file_name")
        .arg(temp_dir.path())
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
        .output()
        .expect("failed to run");
    assert_eq!(output.status.code(), Some(1));
}
