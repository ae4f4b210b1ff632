use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_tutortrackd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tutortrackd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn bad_row_is_reported_by_number_and_does_not_block_siblings() {
    let workspace = temp_dir("tutortrack-bulk-payments");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({
            "name": "Rohan Gupta",
            "phone": "5550003",
            "subject": "Science",
            "monthlyFee": 2000
        }),
    );
    let student_id = created
        .get("student")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_i64())
        .expect("student id");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "payments.bulkCreate",
        json!({
            "items": [
                {
                    "studentId": student_id,
                    "amount": 2000,
                    "month": "January",
                    "year": 2026,
                    "paidDate": "2026-01-04",
                    "method": "cash"
                },
                {
                    "studentId": student_id,
                    "amount": 0,
                    "month": "February",
                    "year": 2026,
                    "paidDate": "2026-02-04",
                    "method": "cash"
                },
                {
                    "studentId": student_id,
                    "amount": 2000,
                    "month": "March",
                    "year": 2026,
                    "paidDate": "2026-03-04",
                    "method": "upi"
                }
            ]
        }),
    );

    assert_eq!(result.get("created").and_then(|v| v.as_i64()), Some(2));
    let errors = result
        .get("errors")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].as_str(), Some("Row 2: Invalid amount"));

    let payments = request_ok(&mut stdin, &mut reader, "4", "payments.list", json!({}));
    let months: Vec<&str> = payments
        .get("payments")
        .and_then(|v| v.as_array())
        .expect("payments")
        .iter()
        .filter_map(|p| p.get("month").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(months, vec!["January", "March"]);

    // Unknown parents are row-level failures too, not request failures.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "payments.bulkCreate",
        json!({
            "items": [
                {
                    "studentId": 9999,
                    "amount": 500,
                    "month": "April",
                    "year": 2026,
                    "paidDate": "2026-04-04"
                }
            ]
        }),
    );
    assert_eq!(result.get("created").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(
        result
            .get("errors")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
