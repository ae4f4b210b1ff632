use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct ScheduleInput {
    student_id: i64,
    day_of_week: String,
    start_time: String,
    end_time: String,
    subject: String,
}

fn valid_time(t: &str) -> bool {
    let bytes = t.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let hour: u32 = match t[0..2].parse() {
        Ok(v) => v,
        Err(_) => return false,
    };
    let minute: u32 = match t[3..5].parse() {
        Ok(v) => v,
        Err(_) => return false,
    };
    hour < 24 && minute < 60
}

fn parse_schedule_input(v: &serde_json::Value) -> Result<ScheduleInput, String> {
    let Some(student_id) = v.get("studentId").and_then(|v| v.as_i64()) else {
        return Err("Missing studentId".to_string());
    };
    let day_of_week = match v.get("dayOfWeek").and_then(|v| v.as_str()) {
        Some(d) if calc::day_index_monday_first(d).is_some() => d.to_string(),
        Some(_) => return Err("dayOfWeek must be a full day name".to_string()),
        None => return Err("Missing required fields".to_string()),
    };
    let start_time = match v.get("startTime").and_then(|v| v.as_str()) {
        Some(t) if valid_time(t) => t.to_string(),
        Some(_) => return Err("startTime must be HH:MM".to_string()),
        None => return Err("Missing required fields".to_string()),
    };
    let end_time = match v.get("endTime").and_then(|v| v.as_str()) {
        Some(t) if valid_time(t) => t.to_string(),
        Some(_) => return Err("endTime must be HH:MM".to_string()),
        None => return Err("Missing required fields".to_string()),
    };
    let subject = match v.get("subject").and_then(|v| v.as_str()).map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return Err("Missing required fields".to_string()),
    };

    Ok(ScheduleInput {
        student_id,
        day_of_week,
        start_time,
        end_time,
        subject,
    })
}

fn student_exists(conn: &Connection, student_id: i64) -> Result<bool, rusqlite::Error> {
    Ok(conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn insert_schedule(conn: &Connection, input: &ScheduleInput) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO schedules(student_id, day_of_week, start_time, end_time, subject)
         VALUES(?, ?, ?, ?, ?)",
        (
            input.student_id,
            &input.day_of_week,
            &input.start_time,
            &input.end_time,
            &input.subject,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

fn schedule_rows(
    conn: &Connection,
    student_id: Option<i64>,
) -> Result<Vec<serde_json::Value>, rusqlite::Error> {
    let map_row = |r: &rusqlite::Row<'_>| -> Result<serde_json::Value, rusqlite::Error> {
        Ok(json!({
            "id": r.get::<_, i64>(0)?,
            "studentId": r.get::<_, i64>(1)?,
            "dayOfWeek": r.get::<_, String>(2)?,
            "startTime": r.get::<_, String>(3)?,
            "endTime": r.get::<_, String>(4)?,
            "subject": r.get::<_, String>(5)?,
        }))
    };

    match student_id {
        Some(sid) => {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, day_of_week, start_time, end_time, subject
                 FROM schedules WHERE student_id = ? ORDER BY id",
            )?;
            stmt.query_map([sid], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, day_of_week, start_time, end_time, subject
                 FROM schedules ORDER BY id",
            )?;
            stmt.query_map([], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
    }
}

fn handle_schedules_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "schedules": [] }));
    };
    match schedule_rows(conn, None) {
        Ok(schedules) => ok(&req.id, json!({ "schedules": schedules })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_schedules_list_by_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    match schedule_rows(conn, Some(student_id)) {
        Ok(schedules) => ok(&req.id, json!({ "schedules": schedules })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_schedules_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let input = match parse_schedule_input(&req.params) {
        Ok(v) => v,
        Err(message) => return err(&req.id, "bad_params", message, None),
    };
    match student_exists(conn, input.student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let schedule_id = match insert_schedule(conn, &input) {
        Ok(id) => id,
        Err(e) => {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "schedules" })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "schedule": {
                "id": schedule_id,
                "studentId": input.student_id,
                "dayOfWeek": input.day_of_week,
                "startTime": input.start_time,
                "endTime": input.end_time,
                "subject": input.subject,
            }
        }),
    )
}

fn handle_schedules_bulk_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(items) = req.params.get("items").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing items array", None);
    };

    let mut created = 0usize;
    let mut errors: Vec<String> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let row_no = i + 1;
        let input = match parse_schedule_input(item) {
            Ok(v) => v,
            Err(message) => {
                errors.push(format!("Row {}: {}", row_no, message));
                continue;
            }
        };
        match student_exists(conn, input.student_id) {
            Ok(true) => {}
            Ok(false) => {
                errors.push(format!("Row {}: Student not found", row_no));
                continue;
            }
            Err(e) => {
                errors.push(format!("Row {}: {}", row_no, e));
                continue;
            }
        }
        match insert_schedule(conn, &input) {
            Ok(_) => created += 1,
            Err(e) => errors.push(format!("Row {}: {}", row_no, e)),
        }
    }

    ok(&req.id, json!({ "created": created, "errors": errors }))
}

fn handle_schedules_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(schedule_id) = req.params.get("scheduleId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing scheduleId", None);
    };

    match conn.execute("DELETE FROM schedules WHERE id = ?", [schedule_id]) {
        Ok(0) => err(&req.id, "not_found", "schedule not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedules.list" => Some(handle_schedules_list(state, req)),
        "schedules.listByStudent" => Some(handle_schedules_list_by_student(state, req)),
        "schedules.create" => Some(handle_schedules_create(state, req)),
        "schedules.bulkCreate" => Some(handle_schedules_bulk_create(state, req)),
        "schedules.delete" => Some(handle_schedules_delete(state, req)),
        _ => None,
    }
}
