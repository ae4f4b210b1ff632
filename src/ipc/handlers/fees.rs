use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn fee_json(r: &rusqlite::Row<'_>) -> Result<serde_json::Value, rusqlite::Error> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "studentId": r.get::<_, i64>(1)?,
        "month": r.get::<_, String>(2)?,
        "year": r.get::<_, i64>(3)?,
        "amount": r.get::<_, i64>(4)?,
    }))
}

fn handle_fees_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let month = match req.params.get("month").and_then(|v| v.as_str()) {
        Some(m) if calc::month_index(m).is_some() => m.to_string(),
        _ => return err(&req.id, "bad_params", "month must be a full month name", None),
    };
    let Some(year) = req.params.get("year").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    // Zero is a legitimate override: the student owes nothing that month.
    let amount = match req.params.get("amount").and_then(|v| v.as_i64()) {
        Some(a) if a >= 0 => a,
        _ => return err(&req.id, "bad_params", "amount must be a non-negative integer", None),
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

    // Single conditional write; no lookup-then-branch race.
    if let Err(e) = conn.execute(
        "INSERT INTO student_fees(student_id, month, year, amount)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, month, year) DO UPDATE SET
           amount = excluded.amount",
        (student_id, &month, year, amount),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "student_fees" })),
        );
    }

    let row = conn
        .query_row(
            "SELECT id, student_id, month, year, amount
             FROM student_fees WHERE student_id = ? AND month = ? AND year = ?",
            (student_id, &month, year),
            |r| fee_json(r),
        )
        .optional();
    match row {
        Ok(Some(fee)) => ok(&req.id, json!({ "fee": fee })),
        Ok(None) => err(&req.id, "db_query_failed", "upserted row missing", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_fees_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "fees": [] }));
    };
    let mut stmt = match conn.prepare(
        "SELECT id, student_id, month, year, amount FROM student_fees ORDER BY id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| fee_json(r))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(fees) => ok(&req.id, json!({ "fees": fees })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_fees_list_by_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let mut stmt = match conn.prepare(
        "SELECT id, student_id, month, year, amount
         FROM student_fees WHERE student_id = ? ORDER BY year, id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([student_id], |r| fee_json(r))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(fees) => ok(&req.id, json!({ "fees": fees })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_fees_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(fee_id) = req.params.get("feeId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing feeId", None);
    };

    match conn.execute("DELETE FROM student_fees WHERE id = ?", [fee_id]) {
        Ok(0) => err(&req.id, "not_found", "fee override not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.set" => Some(handle_fees_set(state, req)),
        "fees.list" => Some(handle_fees_list(state, req)),
        "fees.listByStudent" => Some(handle_fees_list_by_student(state, req)),
        "fees.delete" => Some(handle_fees_delete(state, req)),
        _ => None,
    }
}
