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

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    fee: i64,
) -> i64 {
    let created = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({
            "name": name,
            "phone": "5550001",
            "subject": "Mathematics",
            "monthlyFee": fee
        }),
    );
    created
        .get("student")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_i64())
        .expect("student id")
}

#[test]
fn restore_of_own_export_preserves_content_with_fresh_identities() {
    let workspace = temp_dir("tutortrack-roundtrip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let aarav = create_student(&mut stdin, &mut reader, "2", "Aarav Sharma", 2500);
    let priya = create_student(&mut stdin, &mut reader, "3", "Priya Patel", 3000);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedules.create",
        json!({
            "studentId": aarav,
            "dayOfWeek": "Monday",
            "startTime": "16:00",
            "endTime": "17:00",
            "subject": "Mathematics"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "payments.create",
        json!({
            "studentId": priya,
            "amount": 3000,
            "month": "March",
            "year": 2026,
            "paidDate": "2026-03-02",
            "method": "upi",
            "notes": "Paid on time"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "fees.set",
        json!({ "studentId": aarav, "month": "April", "year": 2026, "amount": 1250 }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "backup.exportSnapshot",
        json!({}),
    );
    let snapshot = exported.get("snapshot").cloned().expect("snapshot");
    assert_eq!(
        snapshot.get("version").and_then(|v| v.as_str()),
        Some("1.0")
    );
    assert!(snapshot
        .get("exportedAt")
        .and_then(|v| v.as_str())
        .is_some());

    // Drift the live dataset so the restore has something to undo.
    let _ = create_student(&mut stdin, &mut reader, "8", "Rohan Gupta", 2000);

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "backup.restoreSnapshot",
        json!({ "snapshot": snapshot }),
    );
    assert_eq!(summary.get("students").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(summary.get("schedules").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(summary.get("payments").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(summary.get("studentFees").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(summary.get("skipped").and_then(|v| v.as_i64()), Some(0));

    let students = request_ok(&mut stdin, &mut reader, "10", "students.list", json!({}));
    let students = students
        .get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("students");
    assert_eq!(students.len(), 2);
    let mut names: Vec<&str> = students
        .iter()
        .filter_map(|s| s.get("name").and_then(|v| v.as_str()))
        .collect();
    names.sort();
    assert_eq!(names, vec!["Aarav Sharma", "Priya Patel"]);

    // Cross-references survived the identity remap: the schedule belongs to
    // Aarav and the payment to Priya, whatever their new ids are.
    let new_aarav = students
        .iter()
        .find(|s| s.get("name").and_then(|v| v.as_str()) == Some("Aarav Sharma"))
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_i64())
        .expect("new aarav id");
    let new_priya = students
        .iter()
        .find(|s| s.get("name").and_then(|v| v.as_str()) == Some("Priya Patel"))
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_i64())
        .expect("new priya id");

    let schedules = request_ok(&mut stdin, &mut reader, "11", "schedules.list", json!({}));
    let schedules = schedules
        .get("schedules")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("schedules");
    assert_eq!(schedules.len(), 1);
    assert_eq!(
        schedules[0].get("studentId").and_then(|v| v.as_i64()),
        Some(new_aarav)
    );

    let payments = request_ok(&mut stdin, &mut reader, "12", "payments.list", json!({}));
    let payments = payments
        .get("payments")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("payments");
    assert_eq!(payments.len(), 1);
    assert_eq!(
        payments[0].get("studentId").and_then(|v| v.as_i64()),
        Some(new_priya)
    );
    assert_eq!(payments[0].get("amount").and_then(|v| v.as_i64()), Some(3000));

    let fees = request_ok(&mut stdin, &mut reader, "13", "fees.list", json!({}));
    let fees = fees.get("fees").and_then(|v| v.as_array()).cloned().expect("fees");
    assert_eq!(fees.len(), 1);
    assert_eq!(
        fees[0].get("studentId").and_then(|v| v.as_i64()),
        Some(new_aarav)
    );
    assert_eq!(fees[0].get("amount").and_then(|v| v.as_i64()), Some(1250));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
