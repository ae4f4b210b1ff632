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

fn request(
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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("tutortrack-router-smoke");
    let bundle_out = workspace.join("smoke-backup.ttbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "name": "Smoke Student",
            "phone": "5550001",
            "subject": "Mathematics",
            "monthlyFee": 500
        }),
    );
    let student_id = created
        .get("result")
        .and_then(|v| v.get("student"))
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_i64())
        .expect("student id");

    let _ = request(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.get",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.update",
        json!({ "studentId": student_id, "patch": { "grade": "10th" } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "schedules.create",
        json!({
            "studentId": student_id,
            "dayOfWeek": "Monday",
            "startTime": "16:00",
            "endTime": "17:00",
            "subject": "Mathematics"
        }),
    );
    let _ = request(&mut stdin, &mut reader, "8", "schedules.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "schedules.listByStudent",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "payments.create",
        json!({
            "studentId": student_id,
            "amount": 500,
            "month": "March",
            "year": 2026,
            "paidDate": "2026-03-05",
            "method": "upi"
        }),
    );
    let _ = request(&mut stdin, &mut reader, "11", "payments.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "payments.listByStudent",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "fees.set",
        json!({ "studentId": student_id, "month": "April", "year": 2026, "amount": 250 }),
    );
    let _ = request(&mut stdin, &mut reader, "14", "fees.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "fees.listByStudent",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "reports.dashboardModel",
        json!({ "date": "2026-03-02" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "reports.studentsModel",
        json!({ "month": "March", "year": 2026 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "reports.schedulesModel",
        json!({}),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "reports.paymentsModel",
        json!({ "year": 2026, "month": "March" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "reports.familiesModel",
        json!({ "month": "March", "year": 2026 }),
    );
    let exported = request(
        &mut stdin,
        &mut reader,
        "21",
        "backup.exportSnapshot",
        json!({}),
    );
    let snapshot = exported
        .get("result")
        .and_then(|v| v.get("snapshot"))
        .cloned()
        .expect("snapshot");
    let _ = request(
        &mut stdin,
        &mut reader,
        "22",
        "backup.restoreSnapshot",
        json!({ "snapshot": snapshot }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "23",
        "backup.exportSnapshotBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "24",
        "backup.importSnapshotBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "25",
        "schedules.delete",
        json!({ "scheduleId": 9999 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "26",
        "students.delete",
        json!({ "studentId": 9999 }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
