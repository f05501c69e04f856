//! Whole-dataset backup: export/restore documents, the periodic
//! reminder policy, and a CSV dose-history report.
//!
//! The export document shape is part of the storage contract; the
//! filename and where it lands are the caller's concern.

use crate::types::{local_date_of_ms, setting_keys, DoseLog, Medication, Snapshot};
use crate::{Error, Repository, Result};
use chrono::{Duration, Local, NaiveDate, TimeZone};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Default reminder interval; overridable through configuration
pub const DEFAULT_REMINDER_INTERVAL_DAYS: i64 = 30;

/// The full dataset as an export document
pub fn build_export_document(repo: &Repository) -> Result<Snapshot> {
    repo.export_snapshot()
}

/// Validate and destructively import an export document.
///
/// `people` and `medications` must be present as arrays (possibly
/// empty); `doseLogs` is optional and treated as empty when absent.
/// Validation failures reject the whole document before any collection
/// is touched.
pub fn restore_from_document(repo: &Repository, document: &Value) -> Result<Snapshot> {
    let object = document
        .as_object()
        .ok_or_else(|| Error::MalformedImport("document is not an object".into()))?;

    for key in ["people", "medications"] {
        match object.get(key) {
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(Error::MalformedImport(format!("'{key}' is not an array")));
            }
            None => {
                return Err(Error::MalformedImport(format!("missing '{key}' array")));
            }
        }
    }
    if let Some(logs) = object.get("doseLogs") {
        if !logs.is_array() {
            return Err(Error::MalformedImport("'doseLogs' is not an array".into()));
        }
    }

    let snapshot: Snapshot = serde_json::from_value(document.clone())
        .map_err(|e| Error::MalformedImport(e.to_string()))?;

    repo.import_snapshot(&snapshot)?;
    Ok(snapshot)
}

fn setting_i64(repo: &Repository, key: &str) -> Result<Option<i64>> {
    Ok(repo.get_setting(key)?.and_then(|v| v.as_i64()))
}

/// Whether the periodic backup reminder is due.
///
/// Due iff the `backupReminder` setting is true and the last reminder
/// is unset or older than the interval. The caller either performs a
/// backup (`mark_backup_done`) or snoozes (`snooze_reminder`).
pub fn reminder_due(repo: &Repository, now: i64, interval_days: i64) -> Result<bool> {
    let enabled = repo
        .get_setting(setting_keys::BACKUP_REMINDER)?
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !enabled {
        return Ok(false);
    }

    let interval_ms = Duration::days(interval_days).num_milliseconds();
    match setting_i64(repo, setting_keys::LAST_BACKUP_REMINDER)? {
        None => Ok(true),
        Some(last) => Ok(now - last > interval_ms),
    }
}

/// Record a completed backup: resets both the backup timestamp and the
/// reminder clock
pub fn mark_backup_done(repo: &Repository, now: i64) -> Result<()> {
    repo.put_setting(setting_keys::LAST_BACKUP, Value::from(now))?;
    repo.put_setting(setting_keys::LAST_BACKUP_REMINDER, Value::from(now))?;
    tracing::debug!("Backup recorded at {}", now);
    Ok(())
}

/// Snooze the reminder without recording a backup
pub fn snooze_reminder(repo: &Repository, now: i64) -> Result<()> {
    repo.put_setting(setting_keys::LAST_BACKUP_REMINDER, Value::from(now))
}

/// CSV row for the dose-history report
#[derive(Debug, serde::Serialize)]
struct HistoryRow {
    log_id: String,
    medication_id: String,
    medication_name: String,
    scheduled_time: Option<String>,
    taken_at: String,
    date: String,
}

fn history_row(log: &DoseLog, medications: &HashMap<&str, &Medication>) -> HistoryRow {
    let taken_at = Local
        .timestamp_millis_opt(log.timestamp)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();
    let date = local_date_of_ms(log.timestamp)
        .map(|d| d.to_string())
        .unwrap_or_default();

    HistoryRow {
        log_id: log.id.clone(),
        medication_id: log.medication_id.clone(),
        medication_name: medications
            .get(log.medication_id.as_str())
            .map(|m| m.name.clone())
            .unwrap_or_default(),
        scheduled_time: log.scheduled_time.clone(),
        taken_at,
        date,
    }
}

/// Write the dose history since `since` (inclusive) to a CSV file,
/// newest first. Returns the number of rows written.
pub fn export_history_csv(repo: &Repository, path: &Path, since: NaiveDate) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let medications = repo.list_medications()?;
    let by_id: HashMap<&str, &Medication> =
        medications.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut logs: Vec<DoseLog> = repo
        .list_dose_logs()?
        .into_iter()
        .filter(|log| log.local_date().map_or(false, |d| d >= since))
        .collect();
    logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut writer = csv::Writer::from_path(path)?;
    for log in &logs {
        writer.serialize(history_row(log, &by_id))?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} history rows to {:?}", logs.len(), path);
    Ok(logs.len())
}
