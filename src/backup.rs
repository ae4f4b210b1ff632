use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const SNAPSHOT_VERSION: &str = "1.0";

const MANIFEST_ENTRY: &str = "manifest.json";
const SNAPSHOT_ENTRY: &str = "data/snapshot.json";
pub const BUNDLE_FORMAT_V1: &str = "tutortrack-snapshot-v1";

fn default_status() -> String {
    "active".to_string()
}

fn default_method() -> String {
    "cash".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: i64,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    pub subject: String,
    pub monthly_fee: i64,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub id: i64,
    pub student_id: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: i64,
    pub student_id: i64,
    pub amount: i64,
    pub month: String,
    pub year: i64,
    pub paid_date: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeOverrideRecord {
    pub id: i64,
    pub student_id: i64,
    pub month: String,
    pub year: i64,
    pub amount: i64,
}

/// Full point-in-time export of the entity store. `studentFees` arrived after
/// the first released backup format, so it stays optional: older snapshots
/// restore with zero overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: String,
    pub exported_at: String,
    pub students: Vec<StudentRecord>,
    pub schedules: Vec<ScheduleRecord>,
    pub payments: Vec<PaymentRecord>,
    #[serde(default)]
    pub student_fees: Vec<FeeOverrideRecord>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub students: usize,
    pub schedules: usize,
    pub payments: usize,
    pub student_fees: usize,
    pub skipped: usize,
}

pub fn export_snapshot(conn: &Connection) -> anyhow::Result<Snapshot> {
    let mut stmt = conn.prepare(
        "SELECT id, name, phone, email, grade, subject, monthly_fee, status, family_name
         FROM students ORDER BY id",
    )?;
    let students = stmt
        .query_map([], |r| {
            Ok(StudentRecord {
                id: r.get(0)?,
                name: r.get(1)?,
                phone: r.get(2)?,
                email: r.get(3)?,
                grade: r.get(4)?,
                subject: r.get(5)?,
                monthly_fee: r.get(6)?,
                status: r.get(7)?,
                family_name: r.get(8)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut stmt = conn.prepare(
        "SELECT id, student_id, day_of_week, start_time, end_time, subject
         FROM schedules ORDER BY id",
    )?;
    let schedules = stmt
        .query_map([], |r| {
            Ok(ScheduleRecord {
                id: r.get(0)?,
                student_id: r.get(1)?,
                day_of_week: r.get(2)?,
                start_time: r.get(3)?,
                end_time: r.get(4)?,
                subject: r.get(5)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut stmt = conn.prepare(
        "SELECT id, student_id, amount, month, year, paid_date, method, notes
         FROM payments ORDER BY id",
    )?;
    let payments = stmt
        .query_map([], |r| {
            Ok(PaymentRecord {
                id: r.get(0)?,
                student_id: r.get(1)?,
                amount: r.get(2)?,
                month: r.get(3)?,
                year: r.get(4)?,
                paid_date: r.get(5)?,
                method: r.get(6)?,
                notes: r.get(7)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut stmt = conn.prepare(
        "SELECT id, student_id, month, year, amount
         FROM student_fees ORDER BY id",
    )?;
    let student_fees = stmt
        .query_map([], |r| {
            Ok(FeeOverrideRecord {
                id: r.get(0)?,
                student_id: r.get(1)?,
                month: r.get(2)?,
                year: r.get(3)?,
                amount: r.get(4)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        students,
        schedules,
        payments,
        student_fees,
    })
}

/// Atomically replace the entire dataset with the snapshot contents.
///
/// Snapshot identities are not reusable (the storage layer assigns ids on
/// insert), so students are inserted first while building an old-to-new id
/// map, and every child row is rewritten through that map. A child row whose
/// parent is absent from the snapshot is dropped and counted, never fatal.
/// Any storage error aborts the transaction and leaves the prior dataset
/// intact.
pub fn restore_snapshot(conn: &Connection, snapshot: &Snapshot) -> anyhow::Result<RestoreSummary> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin restore transaction")?;

    // Children before parents.
    tx.execute("DELETE FROM student_fees", [])?;
    tx.execute("DELETE FROM payments", [])?;
    tx.execute("DELETE FROM schedules", [])?;
    tx.execute("DELETE FROM students", [])?;

    let mut summary = RestoreSummary::default();
    let mut id_map: HashMap<i64, i64> = HashMap::new();

    for s in &snapshot.students {
        tx.execute(
            "INSERT INTO students(name, phone, email, grade, subject, monthly_fee, status, family_name)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &s.name,
                &s.phone,
                &s.email,
                &s.grade,
                &s.subject,
                s.monthly_fee,
                &s.status,
                &s.family_name,
            ),
        )?;
        id_map.insert(s.id, tx.last_insert_rowid());
        summary.students += 1;
    }

    for sc in &snapshot.schedules {
        let Some(&student_id) = id_map.get(&sc.student_id) else {
            summary.skipped += 1;
            continue;
        };
        tx.execute(
            "INSERT INTO schedules(student_id, day_of_week, start_time, end_time, subject)
             VALUES(?, ?, ?, ?, ?)",
            (
                student_id,
                &sc.day_of_week,
                &sc.start_time,
                &sc.end_time,
                &sc.subject,
            ),
        )?;
        summary.schedules += 1;
    }

    for p in &snapshot.payments {
        let Some(&student_id) = id_map.get(&p.student_id) else {
            summary.skipped += 1;
            continue;
        };
        tx.execute(
            "INSERT INTO payments(student_id, amount, month, year, paid_date, method, notes)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                student_id,
                p.amount,
                &p.month,
                p.year,
                &p.paid_date,
                &p.method,
                &p.notes,
            ),
        )?;
        summary.payments += 1;
    }

    for f in &snapshot.student_fees {
        let Some(&student_id) = id_map.get(&f.student_id) else {
            summary.skipped += 1;
            continue;
        };
        tx.execute(
            "INSERT INTO student_fees(student_id, month, year, amount)
             VALUES(?, ?, ?, ?)",
            (student_id, &f.month, f.year, f.amount),
        )?;
        summary.student_fees += 1;
    }

    tx.commit().context("failed to commit restore transaction")?;
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

pub fn export_snapshot_bundle(snapshot: &Snapshot, out_path: &Path) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let snapshot_text =
        serde_json::to_string_pretty(snapshot).context("failed to serialize snapshot")?;
    let checksum = sha256_hex(snapshot_text.as_bytes());

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": snapshot.exported_at,
        "snapshotSha256": checksum,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(SNAPSHOT_ENTRY, opts)
        .context("failed to start snapshot entry")?;
    zip.write_all(snapshot_text.as_bytes())
        .context("failed to write snapshot entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
    })
}

/// Read a snapshot back from disk. Accepts both the zip bundle written by
/// `export_snapshot_bundle` and a bare `.json` snapshot (the format the web
/// client downloads).
pub fn import_snapshot_bundle(in_path: &Path) -> anyhow::Result<Snapshot> {
    if !is_zip_file(in_path)? {
        let text = std::fs::read_to_string(in_path)
            .with_context(|| format!("failed to read snapshot {}", in_path.to_string_lossy()))?;
        return serde_json::from_str(&text).context("snapshot file is not a valid backup");
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut snapshot_text = String::new();
    archive
        .by_name(SNAPSHOT_ENTRY)
        .context("bundle missing data/snapshot.json")?
        .read_to_string(&mut snapshot_text)
        .context("failed to read snapshot entry")?;

    if let Some(expected) = manifest.get("snapshotSha256").and_then(|v| v.as_str()) {
        let actual = sha256_hex(snapshot_text.as_bytes());
        if actual != expected {
            return Err(anyhow!("snapshot checksum mismatch, bundle is corrupted"));
        }
    }

    serde_json::from_str(&snapshot_text).context("snapshot entry is not a valid backup")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
