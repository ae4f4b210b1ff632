use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_export_snapshot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match backup::export_snapshot(conn) {
        Ok(snapshot) => ok(&req.id, json!({ "snapshot": snapshot })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn parse_snapshot(req: &Request) -> Result<backup::Snapshot, serde_json::Value> {
    let Some(raw) = req.params.get("snapshot") else {
        return Err(err(&req.id, "bad_params", "missing snapshot", None));
    };
    // Schema-validated parse before anything destructive runs.
    let snapshot: backup::Snapshot = serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_snapshot",
            "this doesn't look like a valid backup",
            Some(json!({ "parseError": e.to_string() })),
        )
    })?;
    if snapshot.version.trim().is_empty() {
        return Err(err(
            &req.id,
            "bad_snapshot",
            "snapshot is missing a version",
            None,
        ));
    }
    Ok(snapshot)
}

fn handle_restore_snapshot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let snapshot = match parse_snapshot(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match backup::restore_snapshot(conn, &snapshot) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => err(&req.id, "restore_failed", e.to_string(), None),
    }
}

fn handle_export_snapshot_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };

    let snapshot = match backup::export_snapshot(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let out = PathBuf::from(&out_path);
    let export = match backup::export_snapshot_bundle(&snapshot, &out) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "students": snapshot.students.len(),
            "schedules": snapshot.schedules.len(),
            "payments": snapshot.payments.len(),
            "studentFees": snapshot.student_fees.len(),
        }),
    )
}

fn handle_import_snapshot_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "backup file not found",
            Some(json!({ "path": in_path })),
        );
    }

    let snapshot = match backup::import_snapshot_bundle(&src) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_snapshot",
                e.to_string(),
                Some(json!({ "path": in_path })),
            )
        }
    };

    match backup::restore_snapshot(conn, &snapshot) {
        Ok(summary) => {
            let mut payload = json!(summary);
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("path".to_string(), json!(in_path));
            }
            ok(&req.id, payload)
        }
        Err(e) => err(&req.id, "restore_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportSnapshot" => Some(handle_export_snapshot(state, req)),
        "backup.restoreSnapshot" => Some(handle_restore_snapshot(state, req)),
        "backup.exportSnapshotBundle" => Some(handle_export_snapshot_bundle(state, req)),
        "backup.importSnapshotBundle" => Some(handle_import_snapshot_bundle(state, req)),
        _ => None,
    }
}
