// Integration tests for the termbridge binary
// Run with: cargo test --test cli_commands_test

use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn termbridge(config_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_termbridge"));
    cmd.env("TERMBRIDGE_CONFIG_DIR", config_dir)
        .env_remove("TERMBRIDGE_SOCKET")
        .env_remove("TERMBRIDGE_HELPER")
        .env_remove("TERMBRIDGE_TMUX")
        .env_remove("TERMBRIDGE_LOG_FILE")
        .env("RUST_LOG", "warn");
    cmd
}

/// Write an executable shell script that ignores its arguments.
fn fake_tmux(dir: &Path) -> PathBuf {
    let path = dir.join("fake-tmux");
    std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            child.kill().ok();
            panic!("termbridge did not exit in time");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Missing helper program fails before anything is bound
#[test]
fn test_serve_rejects_missing_helper() {
    let tmp = TempDir::new().unwrap();
    let output = termbridge(tmp.path())
        .args(["serve", "--helper", "/nonexistent/capture-helper"])
        .arg(tmp.path().join("bridge.sock"))
        .output()
        .expect("Failed to execute serve");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Helper program not found"), "stderr: {stderr}");
    assert!(!tmp.path().join("bridge.sock").exists());
}

/// A helper without an exec bit is rejected
#[test]
fn test_serve_rejects_non_executable_helper() {
    let tmp = TempDir::new().unwrap();
    let helper = tmp.path().join("helper");
    std::fs::write(&helper, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&helper, std::fs::Permissions::from_mode(0o644)).unwrap();

    let output = termbridge(tmp.path())
        .args(["serve", "--helper"])
        .arg(&helper)
        .arg(tmp.path().join("bridge.sock"))
        .output()
        .expect("Failed to execute serve");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not executable"), "stderr: {stderr}");
}

/// An unreachable terminal host is fatal at startup
#[test]
fn test_serve_fails_when_host_unreachable() {
    let tmp = TempDir::new().unwrap();
    let helper = fake_tmux(tmp.path());

    let output = termbridge(tmp.path())
        .env("TERMBRIDGE_TMUX", "/nonexistent/tmux")
        .args(["serve", "--helper"])
        .arg(&helper)
        .arg(tmp.path().join("bridge.sock"))
        .output()
        .expect("Failed to execute serve");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not reachable"), "stderr: {stderr}");
    assert!(!tmp.path().join("bridge.sock").exists());
}

/// The capture helper fails when nothing listens on its endpoint
#[test]
fn test_capture_without_endpoint_fails() {
    let tmp = TempDir::new().unwrap();
    let output = termbridge(tmp.path())
        .args(["capture", "%1"])
        .arg(tmp.path().join("missing.sock"))
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute capture");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Capture for session %1 failed"), "stderr: {stderr}");
}

/// Full serve run against an empty tmux server, stopped with SIGTERM
#[test]
fn test_serve_handshake_and_sigterm() {
    let tmp = TempDir::new().unwrap();
    let tmux = fake_tmux(tmp.path());
    let socket = tmp.path().join("bridge.sock");

    let mut child = termbridge(tmp.path())
        .env("TERMBRIDGE_TMUX", &tmux)
        .args(["serve", "--poll-interval-ms", "50", "--helper"])
        .arg(&tmux)
        .arg("--endpoint-dir")
        .arg(tmp.path().join("sessions"))
        .arg(&socket)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn serve");

    let deadline = Instant::now() + Duration::from_secs(5);
    let stream = loop {
        if let Ok(stream) = UnixStream::connect(&socket) {
            break stream;
        }
        assert!(Instant::now() < deadline, "Control socket never appeared");
        std::thread::sleep(Duration::from_millis(20));
    };
    let mode = std::fs::metadata(&socket).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut lines = BufReader::new(stream).lines();
    let mut next = || -> serde_json::Value {
        serde_json::from_str(&lines.next().unwrap().unwrap()).unwrap()
    };
    assert_eq!(next(), serde_json::json!({"type": "sessions", "sessions": []}));
    assert_eq!(next()["type"], "config");
    assert_eq!(next()["type"], "ready");

    // SAFETY: signalling a child process we spawned.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    assert_eq!(rc, 0);

    let status = wait_for_exit(&mut child, Duration::from_secs(5));
    assert!(status.success(), "exit status: {status}");
    assert!(!socket.exists(), "Control socket left behind");
}
