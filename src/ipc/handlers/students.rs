use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct StudentInput {
    name: String,
    phone: String,
    email: Option<String>,
    grade: Option<String>,
    subject: String,
    monthly_fee: i64,
    status: String,
    family_name: Option<String>,
}

fn opt_text(v: Option<&serde_json::Value>) -> Option<String> {
    v.and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_student_input(v: &serde_json::Value) -> Result<StudentInput, String> {
    let required = |key: &str| -> Result<String, String> {
        match v.get(key).and_then(|v| v.as_str()).map(|s| s.trim()) {
            Some(s) if !s.is_empty() => Ok(s.to_string()),
            _ => Err(format!("Missing required field \"{}\"", key)),
        }
    };

    let name = required("name")?;
    let phone = required("phone")?;
    let subject = required("subject")?;
    let monthly_fee = match v.get("monthlyFee").and_then(|v| v.as_i64()) {
        Some(fee) if fee >= 0 => fee,
        _ => return Err("Invalid or missing monthlyFee".to_string()),
    };
    let status = match v.get("status").and_then(|v| v.as_str()) {
        None => "active".to_string(),
        Some("active") => "active".to_string(),
        Some("inactive") => "inactive".to_string(),
        Some(_) => return Err("status must be one of: active, inactive".to_string()),
    };

    Ok(StudentInput {
        name,
        phone,
        email: opt_text(v.get("email")),
        grade: opt_text(v.get("grade")),
        subject,
        monthly_fee,
        status,
        family_name: opt_text(v.get("familyName")),
    })
}

fn insert_student(conn: &Connection, input: &StudentInput) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO students(name, phone, email, grade, subject, monthly_fee, status, family_name)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &input.name,
            &input.phone,
            &input.email,
            &input.grade,
            &input.subject,
            input.monthly_fee,
            &input.status,
            &input.family_name,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

fn student_json(conn: &Connection, student_id: i64) -> Result<Option<serde_json::Value>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name, phone, email, grade, subject, monthly_fee, status, family_name
         FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "phone": r.get::<_, String>(2)?,
                "email": r.get::<_, Option<String>>(3)?,
                "grade": r.get::<_, Option<String>>(4)?,
                "subject": r.get::<_, String>(5)?,
                "monthlyFee": r.get::<_, i64>(6)?,
                "status": r.get::<_, String>(7)?,
                "familyName": r.get::<_, Option<String>>(8)?,
            }))
        },
    )
    .optional()
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, phone, email, grade, subject, monthly_fee, status, family_name
         FROM students ORDER BY id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "phone": r.get::<_, String>(2)?,
                "email": r.get::<_, Option<String>>(3)?,
                "grade": r.get::<_, Option<String>>(4)?,
                "subject": r.get::<_, String>(5)?,
                "monthlyFee": r.get::<_, i64>(6)?,
                "status": r.get::<_, String>(7)?,
                "familyName": r.get::<_, Option<String>>(8)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    match student_json(conn, student_id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let input = match parse_student_input(&req.params) {
        Ok(v) => v,
        Err(message) => return err(&req.id, "bad_params", message, None),
    };

    let student_id = match insert_student(conn, &input) {
        Ok(id) => id,
        Err(e) => {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            )
        }
    };

    match student_json(conn, student_id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "db_query_failed", "inserted row missing", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_bulk_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(items) = req.params.get("items").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing items array", None);
    };

    // Row failures never abort siblings; each one is reported by row number.
    let mut created = 0usize;
    let mut errors: Vec<String> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let row_no = i + 1;
        match parse_student_input(item) {
            Ok(input) => match insert_student(conn, &input) {
                Ok(_) => created += 1,
                Err(e) => errors.push(format!("Row {}: {}", row_no, e)),
            },
            Err(message) => errors.push(format!("Row {}: {}", row_no, message)),
        }
    }

    ok(&req.id, json!({ "created": created, "errors": errors }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<rusqlite::types::Value> = Vec::new();

    for (key, set_sql) in [
        ("name", "name = ?"),
        ("phone", "phone = ?"),
        ("subject", "subject = ?"),
    ] {
        if let Some(v) = patch.get(key) {
            let Some(s) = v.as_str().map(|s| s.trim()) else {
                return err(
                    &req.id,
                    "bad_params",
                    format!("patch.{} must be a string", key),
                    None,
                );
            };
            if s.is_empty() {
                return err(
                    &req.id,
                    "bad_params",
                    format!("{} must not be empty", key),
                    None,
                );
            }
            set_parts.push(set_sql);
            bind_values.push(rusqlite::types::Value::Text(s.to_string()));
        }
    }
    for (key, set_sql) in [
        ("email", "email = ?"),
        ("grade", "grade = ?"),
        ("familyName", "family_name = ?"),
    ] {
        if let Some(v) = patch.get(key) {
            let value = if v.is_null() {
                rusqlite::types::Value::Null
            } else if let Some(s) = v.as_str() {
                let s = s.trim();
                if s.is_empty() {
                    rusqlite::types::Value::Null
                } else {
                    rusqlite::types::Value::Text(s.to_string())
                }
            } else {
                return err(
                    &req.id,
                    "bad_params",
                    format!("patch.{} must be a string or null", key),
                    None,
                );
            };
            set_parts.push(set_sql);
            bind_values.push(value);
        }
    }
    if let Some(v) = patch.get("monthlyFee") {
        let Some(fee) = v.as_i64().filter(|fee| *fee >= 0) else {
            return err(&req.id, "bad_params", "Invalid or missing monthlyFee", None);
        };
        set_parts.push("monthly_fee = ?");
        bind_values.push(rusqlite::types::Value::Integer(fee));
    }
    if let Some(v) = patch.get("status") {
        let status = match v.as_str() {
            Some("active") => "active",
            Some("inactive") => "inactive",
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "status must be one of: active, inactive",
                    None,
                )
            }
        };
        set_parts.push("status = ?");
        bind_values.push(rusqlite::types::Value::Text(status.to_string()));
    }

    if set_parts.is_empty() {
        return err(&req.id, "bad_params", "patch has no recognized fields", None);
    }

    let sql = format!("UPDATE students SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(rusqlite::types::Value::Integer(student_id));
    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(bind_values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match student_json(conn, student_id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Hard delete, children before the student row.
    for (sql, table) in [
        (
            "DELETE FROM student_fees WHERE student_id = ?",
            "student_fees",
        ),
        ("DELETE FROM payments WHERE student_id = ?", "payments"),
        ("DELETE FROM schedules WHERE student_id = ?", "schedules"),
        ("DELETE FROM students WHERE id = ?", "students"),
    ] {
        if let Err(e) = tx.execute(sql, [student_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.bulkCreate" => Some(handle_students_bulk_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
