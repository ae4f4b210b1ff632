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

fn add_schedule(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: i64,
    day: &str,
    start: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "schedules.create",
        json!({
            "studentId": student_id,
            "dayOfWeek": day,
            "startTime": start,
            "endTime": "19:00",
            "subject": "Mathematics"
        }),
    );
}

#[test]
fn day_counts_buckets_and_busiest_day_tie_break() {
    let workspace = temp_dir("tutortrack-schedule-report");
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
            "name": "Priya Patel",
            "phone": "5550002",
            "subject": "Physics",
            "monthlyFee": 3000
        }),
    );
    let student_id = created
        .get("student")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_i64())
        .expect("student id");

    // Sunday and Monday both end up with two classes; the Sunday-first
    // ordering decides the tie.
    add_schedule(&mut stdin, &mut reader, "3", student_id, "Sunday", "10:00");
    add_schedule(&mut stdin, &mut reader, "4", student_id, "Sunday", "17:30");
    add_schedule(&mut stdin, &mut reader, "5", student_id, "Monday", "16:00");
    add_schedule(&mut stdin, &mut reader, "6", student_id, "Monday", "12:00");

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "reports.schedulesModel",
        json!({}),
    );

    assert_eq!(report.get("totalClasses").and_then(|v| v.as_i64()), Some(4));
    assert_eq!(report.get("teachingDays").and_then(|v| v.as_i64()), Some(2));

    let per_day = report
        .get("perDay")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("perDay");
    assert_eq!(per_day.len(), 7);
    assert_eq!(per_day[0].get("day").and_then(|v| v.as_str()), Some("Sunday"));
    assert_eq!(per_day[0].get("classes").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(per_day[1].get("day").and_then(|v| v.as_str()), Some("Monday"));
    assert_eq!(per_day[1].get("classes").and_then(|v| v.as_i64()), Some(2));

    let busiest = report.get("busiestDay").cloned().expect("busiestDay");
    assert_eq!(busiest.get("day").and_then(|v| v.as_str()), Some("Sunday"));
    assert_eq!(busiest.get("classes").and_then(|v| v.as_i64()), Some(2));

    let slots = report
        .get("timeSlots")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("timeSlots");
    let count_of = |name: &str| {
        slots
            .iter()
            .find(|s| s.get("name").and_then(|v| v.as_str()) == Some(name))
            .and_then(|s| s.get("count"))
            .and_then(|v| v.as_i64())
            .unwrap_or(-1)
    };
    assert_eq!(count_of("Morning"), 1);
    assert_eq!(count_of("Afternoon"), 2);
    assert_eq!(count_of("Evening"), 1);

    // Scheduled days listed Monday-first per student.
    let per_student = report
        .get("perStudent")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("perStudent");
    assert_eq!(per_student.len(), 1);
    assert_eq!(
        per_student[0].get("classes").and_then(|v| v.as_i64()),
        Some(4)
    );
    let days: Vec<&str> = per_student[0]
        .get("days")
        .and_then(|v| v.as_array())
        .expect("days")
        .iter()
        .filter_map(|d| d.as_str())
        .collect();
    assert_eq!(days, vec!["Monday", "Sunday"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
