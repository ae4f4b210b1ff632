use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct PaymentInput {
    student_id: i64,
    amount: i64,
    month: String,
    year: i64,
    paid_date: String,
    method: String,
    notes: Option<String>,
}

fn parse_payment_input(v: &serde_json::Value) -> Result<PaymentInput, String> {
    let Some(student_id) = v.get("studentId").and_then(|v| v.as_i64()) else {
        return Err("Missing studentId".to_string());
    };
    let amount = match v.get("amount").and_then(|v| v.as_i64()) {
        Some(a) if a > 0 => a,
        _ => return Err("Invalid amount".to_string()),
    };
    let month = match v.get("month").and_then(|v| v.as_str()) {
        Some(m) if calc::month_index(m).is_some() => m.to_string(),
        _ => return Err("Missing month, year, or paidDate".to_string()),
    };
    let Some(year) = v.get("year").and_then(|v| v.as_i64()) else {
        return Err("Missing month, year, or paidDate".to_string());
    };
    let paid_date = match v.get("paidDate").and_then(|v| v.as_str()).map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => return Err("Missing month, year, or paidDate".to_string()),
    };
    let method = match v.get("method").and_then(|v| v.as_str()) {
        None => "cash".to_string(),
        Some(m) if calc::PAYMENT_METHODS.contains(&m) => m.to_string(),
        Some(_) => {
            return Err(format!(
                "method must be one of: {}",
                calc::PAYMENT_METHODS.join(", ")
            ))
        }
    };
    let notes = v
        .get("notes")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(PaymentInput {
        student_id,
        amount,
        month,
        year,
        paid_date,
        method,
        notes,
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

fn insert_payment(conn: &Connection, input: &PaymentInput) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO payments(student_id, amount, month, year, paid_date, method, notes)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            input.student_id,
            input.amount,
            &input.month,
            input.year,
            &input.paid_date,
            &input.method,
            &input.notes,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

fn payment_rows(
    conn: &Connection,
    student_id: Option<i64>,
) -> Result<Vec<serde_json::Value>, rusqlite::Error> {
    let map_row = |r: &rusqlite::Row<'_>| -> Result<serde_json::Value, rusqlite::Error> {
        Ok(json!({
            "id": r.get::<_, i64>(0)?,
            "studentId": r.get::<_, i64>(1)?,
            "amount": r.get::<_, i64>(2)?,
            "month": r.get::<_, String>(3)?,
            "year": r.get::<_, i64>(4)?,
            "paidDate": r.get::<_, String>(5)?,
            "method": r.get::<_, String>(6)?,
            "notes": r.get::<_, Option<String>>(7)?,
        }))
    };

    match student_id {
        Some(sid) => {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, amount, month, year, paid_date, method, notes
                 FROM payments WHERE student_id = ? ORDER BY id",
            )?;
            stmt.query_map([sid], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, amount, month, year, paid_date, method, notes
                 FROM payments ORDER BY id",
            )?;
            stmt.query_map([], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
    }
}

fn handle_payments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "payments": [] }));
    };
    match payment_rows(conn, None) {
        Ok(payments) => ok(&req.id, json!({ "payments": payments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_payments_list_by_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    match payment_rows(conn, Some(student_id)) {
        Ok(payments) => ok(&req.id, json!({ "payments": payments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_payments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let input = match parse_payment_input(&req.params) {
        Ok(v) => v,
        Err(message) => return err(&req.id, "bad_params", message, None),
    };
    match student_exists(conn, input.student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let payment_id = match insert_payment(conn, &input) {
        Ok(id) => id,
        Err(e) => {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "payments" })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "payment": {
                "id": payment_id,
                "studentId": input.student_id,
                "amount": input.amount,
                "month": input.month,
                "year": input.year,
                "paidDate": input.paid_date,
                "method": input.method,
                "notes": input.notes,
            }
        }),
    )
}

fn handle_payments_bulk_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        let input = match parse_payment_input(item) {
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
        match insert_payment(conn, &input) {
            Ok(_) => created += 1,
            Err(e) => errors.push(format!("Row {}: {}", row_no, e)),
        }
    }

    ok(&req.id, json!({ "created": created, "errors": errors }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.list" => Some(handle_payments_list(state, req)),
        "payments.listByStudent" => Some(handle_payments_list_by_student(state, req)),
        "payments.create" => Some(handle_payments_create(state, req)),
        "payments.bulkCreate" => Some(handle_payments_bulk_create(state, req)),
        _ => None,
    }
}
