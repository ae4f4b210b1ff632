use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{Datelike, Local, NaiveDate};
use rusqlite::Connection;
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn calc_err(req: &Request, e: calc::CalcError) -> serde_json::Value {
    err(
        &req.id,
        &e.code,
        e.message,
        e.details.map(|d| json!(d)).or(None),
    )
}

/// Reference date for a report: an explicit `date` param ("YYYY-MM-DD") or
/// the local clock.
fn resolve_date(req: &Request) -> Result<NaiveDate, serde_json::Value> {
    match req.params.get("date").and_then(|v| v.as_str()) {
        None => Ok(Local::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            err(
                &req.id,
                "bad_params",
                "date must be YYYY-MM-DD",
                Some(json!({ "date": raw })),
            )
        }),
    }
}

fn resolve_month(req: &Request, fallback: &str) -> Result<String, serde_json::Value> {
    match req.params.get("month").and_then(|v| v.as_str()) {
        None => Ok(fallback.to_string()),
        Some(m) if calc::month_index(m).is_some() => Ok(m.to_string()),
        Some(other) => Err(err(
            &req.id,
            "bad_params",
            "month must be a full month name",
            Some(json!({ "month": other })),
        )),
    }
}

fn resolve_year(req: &Request, fallback: i64) -> i64 {
    req.params
        .get("year")
        .and_then(|v| v.as_i64())
        .unwrap_or(fallback)
}

fn load_roster(conn: &Connection, req: &Request) -> Result<calc::Roster, serde_json::Value> {
    calc::Roster::load(conn).map_err(|e| calc_err(req, e))
}

fn handle_dashboard_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match resolve_date(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let roster = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let today = calc::DAYS_MONDAY_FIRST[date.weekday().num_days_from_monday() as usize];
    let month = calc::MONTHS[date.month0() as usize];
    let model = calc::compute_dashboard(&roster, today, month, date.year() as i64);
    ok(&req.id, json!(model))
}

fn handle_students_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = Local::now().date_naive();
    let month = match resolve_month(req, calc::MONTHS[now.month0() as usize]) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = resolve_year(req, now.year() as i64);
    let roster = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let model = calc::compute_student_report(&roster, &month, year);
    ok(&req.id, json!(model))
}

fn handle_schedules_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let roster = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let model = calc::compute_schedule_report(&roster);
    ok(&req.id, json!(model))
}

fn handle_payments_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = Local::now().date_naive();
    let month = match resolve_month(req, calc::MONTHS[now.month0() as usize]) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = resolve_year(req, now.year() as i64);
    let roster = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let model = calc::compute_payment_report(&roster, year, &month);
    ok(&req.id, json!(model))
}

fn handle_families_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = Local::now().date_naive();
    let month = match resolve_month(req, calc::MONTHS[now.month0() as usize]) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = resolve_year(req, now.year() as i64);
    let roster = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let model = calc::compute_family_report(&roster, &month, year);
    ok(&req.id, json!(model))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.dashboardModel" => Some(handle_dashboard_model(state, req)),
        "reports.studentsModel" => Some(handle_students_model(state, req)),
        "reports.schedulesModel" => Some(handle_schedules_model(state, req)),
        "reports.paymentsModel" => Some(handle_payments_model(state, req)),
        "reports.familiesModel" => Some(handle_families_model(state, req)),
        _ => None,
    }
}
