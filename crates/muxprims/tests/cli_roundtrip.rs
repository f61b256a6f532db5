#![cfg(all(unix, feature = "cli"))]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use muxprims::mux::{connect, Connection, MuxConfig};
use muxprims::transport::Endpoint;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/muxcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        assert!(start.elapsed() < timeout, "socket never appeared");
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_for_connect(endpoint: &Endpoint, timeout: Duration) -> Connection {
    let start = Instant::now();
    loop {
        match connect(endpoint, MuxConfig::default()) {
            Ok(conn) => return conn,
            Err(err) => {
                assert!(start.elapsed() < timeout, "connect timeout: {err}");
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn spawn_cli(args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_muxprims"))
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("cli should start")
}

#[test]
fn listen_prints_chunks_from_two_channels() {
    let dir = unique_temp_dir("listen");
    let sock = dir.join("listen.sock");
    let sock_arg = format!("unix:{}", sock.display());

    let child = spawn_cli(&[
        "--format",
        "json",
        "listen",
        &sock_arg,
        "--channels",
        "1,2",
        "--count",
        "2",
    ]);
    wait_for_socket(&sock, Duration::from_secs(5));

    let conn = wait_for_connect(&Endpoint::Unix(sock.clone()), Duration::from_secs(5));
    let one = conn.open_output(1).expect("open 1");
    let two = conn.open_output(2).expect("open 2");
    one.write_bytes(b"alpha").expect("write 1");
    one.flush().expect("flush 1");
    two.write_bytes(b"beta").expect("write 2");
    two.flush().expect("flush 2");

    let output = child.wait_with_output().expect("listen should exit");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    assert_eq!(lines.len(), 2);
    let mut seen: Vec<(u64, String)> = lines
        .iter()
        .map(|v| {
            (
                v["channel"].as_u64().expect("channel"),
                v["payload"].as_str().expect("payload").to_string(),
            )
        })
        .collect();
    seen.sort();
    assert_eq!(
        seen,
        vec![(1, "alpha".to_string()), (2, "beta".to_string())]
    );

    drop(conn);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_with_wait_round_trips_through_echo() {
    let dir = unique_temp_dir("echo");
    let sock = dir.join("echo.sock");
    let sock_arg = format!("unix:{}", sock.display());

    let mut echo = spawn_cli(&["echo", &sock_arg, "--channels", "3", "--frame-size", "8"]);
    wait_for_socket(&sock, Duration::from_secs(5));

    let output = Command::new(env!("CARGO_BIN_EXE_muxprims"))
        .args([
            "--format",
            "raw",
            "--frame-size",
            "8",
            "send",
            &sock_arg,
            "--channel",
            "3",
            "--data",
            "a payload longer than one frame",
            "--wait",
        ])
        .output()
        .expect("send should run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(output.stdout, b"a payload longer than one frame");

    let _ = echo.kill();
    let _ = echo.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_streams_file_payload() {
    let dir = unique_temp_dir("file");
    let sock = dir.join("file.sock");
    let payload_path = dir.join("payload.bin");
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
    std::fs::write(&payload_path, &payload).expect("payload should be writable");

    let endpoint = Endpoint::Unix(sock.clone());
    let listener = muxprims::mux::Listener::bind(&endpoint, MuxConfig::default())
        .expect("listener should bind");
    let server = thread::spawn(move || {
        let conn = listener.accept().expect("accept");
        let mut input = conn.open_input(7).expect("open input");
        let mut got = Vec::new();
        input.read_to_end(&mut got).expect("read");
        got
    });

    let status = Command::new(env!("CARGO_BIN_EXE_muxprims"))
        .arg("send")
        .arg(format!("unix:{}", sock.display()))
        .args(["--channel", "7", "--file"])
        .arg(&payload_path)
        .status()
        .expect("send should run");
    assert!(status.success());

    assert_eq!(server.join().expect("server thread"), payload);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_missing_socket_fails() {
    let dir = unique_temp_dir("missing");
    let output = Command::new(env!("CARGO_BIN_EXE_muxprims"))
        .arg("send")
        .arg(dir.join("nobody.sock"))
        .args(["--data", "x"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_frame_size_is_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_muxprims"))
        .env("MUXPRIMS_FRAME_SIZE", "0")
        .args(["send", "tcp:127.0.0.1:1", "--data", "x"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_muxprims"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("muxprims {}", env!("CARGO_PKG_VERSION"))
    );
}
