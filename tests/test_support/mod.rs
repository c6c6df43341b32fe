#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar_with_args(args: &[&str]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .args(args)
        .env_remove("ATTENDANCED_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_args(&[])
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Asserts a failure with `code` and returns the error object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    code: &str,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    let error = value.get("error").cloned().expect("error object");
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some(code),
        "{}: {}",
        method,
        value
    );
    error
}

pub fn open_workspace_db(workspace: &Path) -> Connection {
    let conn = Connection::open(workspace.join("attendance.sqlite3")).expect("open workspace db");
    conn.busy_timeout(Duration::from_secs(5)).expect("busy timeout");
    conn
}

pub fn sha256_hex(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

pub fn seed_user(conn: &Connection, user_id: &str, email: &str, token: &str) {
    conn.execute(
        "INSERT INTO users(id, email) VALUES(?, ?)",
        (user_id, email),
    )
    .expect("insert user");
    seed_credential(conn, user_id, email, token);
}

pub fn seed_credential(conn: &Connection, user_id: &str, email: &str, token: &str) {
    conn.execute(
        "INSERT INTO credentials(token_sha256, user_id, email) VALUES(?, ?, ?)",
        (sha256_hex(token), user_id, email),
    )
    .expect("insert credential");
}

pub fn seed_day(conn: &Connection, weekday: &str, subjects: &[&str]) {
    for (i, subject) in subjects.iter().enumerate() {
        conn.execute(
            "INSERT INTO schedule_slots(weekday, position, subject) VALUES(?, ?, ?)",
            (weekday, i as i64, subject),
        )
        .expect("insert schedule slot");
    }
}

pub fn seed_cancellation(conn: &Connection, date: &str, slot_index: i64) {
    conn.execute(
        "INSERT INTO slot_overrides(date, slot_index, cancelled) VALUES(?, ?, 1)",
        (date, slot_index),
    )
    .expect("insert override");
}

pub fn seed_admin(conn: &Connection, email: &str) {
    conn.execute("INSERT INTO admins(email) VALUES(?)", [email])
        .expect("insert admin");
}
