#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CLASS: &str = "jss1";
pub const SESSION: &str = "2024-2025";

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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(
    vars: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>,
) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut cmd = Command::new(exe);
    cmd.env("RESULTSD_LOG", "off")
        .env_remove("RESULTSD_ZERO_POLICY")
        .env_remove("RESULTSD_REMARK_SEED");
    for (k, v) in vars {
        cmd.env(k, v);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
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

/// Asserts a failed reply and returns its error object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

/// Selects a fresh workspace and loads one class (Mathematics, English, Biology) with
/// the given `(id, first, last)` students enrolled for the session.
pub fn seed_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
    students: &[(&str, &str, &str)],
) -> PathBuf {
    let workspace = temp_dir(prefix);
    request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "seed-class",
        "roster.classes.upsert",
        json!({ "id": CLASS, "name": "JSS 1" }),
    );
    request_ok(
        stdin,
        reader,
        "seed-session",
        "roster.sessions.upsert",
        json!({ "id": SESSION, "name": "2024/2025" }),
    );
    for (id, name) in [("math", "Mathematics"), ("eng", "English"), ("bio", "Biology")] {
        request_ok(
            stdin,
            reader,
            "seed-subject",
            "roster.subjects.upsert",
            json!({ "id": id, "name": name }),
        );
    }
    request_ok(
        stdin,
        reader,
        "seed-class-subjects",
        "roster.classSubjects.set",
        json!({ "classId": CLASS, "subjectIds": ["math", "eng", "bio"] }),
    );
    let mut ids = Vec::new();
    for (id, first, last) in students {
        request_ok(
            stdin,
            reader,
            "seed-student",
            "roster.students.upsert",
            json!({ "id": id, "firstName": first, "lastName": last }),
        );
        ids.push(id.to_string());
    }
    request_ok(
        stdin,
        reader,
        "seed-enroll",
        "roster.enrollments.set",
        json!({ "classId": CLASS, "sessionId": SESSION, "studentIds": ids }),
    );
    workspace
}

pub fn score_params(
    student: &str,
    subject: &str,
    term: &str,
    extra: serde_json::Value,
) -> serde_json::Value {
    let mut p = json!({
        "studentId": student,
        "subjectId": subject,
        "classId": CLASS,
        "sessionId": SESSION,
        "term": term,
    });
    if let (Some(obj), Some(more)) = (p.as_object_mut(), extra.as_object()) {
        for (k, v) in more {
            obj.insert(k.clone(), v.clone());
        }
    }
    p
}
