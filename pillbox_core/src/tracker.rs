//! Dose-log tracking: taken-today views, history windows, log/unlog.
//!
//! There is no daily reset job. "Today's doses" is always derived by
//! filtering logs whose timestamp falls on the requested local calendar
//! date, so state simply rolls over at midnight on read.
//!
//! Duplicate logs for the same (medication, date, slot) tuple are
//! accepted: concurrent toggles can race, and the views here count
//! distinct slots so duplicates never inflate completion.

use crate::types::{DoseLog, Medication};
use crate::{Repository, Result};
use chrono::NaiveDate;
use std::collections::HashSet;

/// Logs for one medication on one local calendar date
pub fn logs_for_medication_on_date(
    repo: &Repository,
    medication_id: &str,
    date: NaiveDate,
) -> Result<Vec<DoseLog>> {
    Ok(repo
        .list_dose_logs()?
        .into_iter()
        .filter(|log| log.medication_id == medication_id)
        .filter(|log| log.local_date() == Some(date))
        .collect())
}

/// Create and persist a dose log stamped with the current instant.
///
/// `scheduled_time` is the HH:MM slot being satisfied, or None for an
/// as-needed dose. The slot is not validated against the medication's
/// configured times; passing a valid slot is the caller's concern.
pub fn log_dose(
    repo: &Repository,
    medication_id: &str,
    scheduled_time: Option<String>,
) -> Result<DoseLog> {
    let log = DoseLog::new(medication_id, scheduled_time);
    repo.add_dose_log(&log)?;
    tracing::debug!(
        "Logged dose for medication {} (slot {:?})",
        medication_id,
        log.scheduled_time
    );
    Ok(log)
}

/// Delete a single log by id (undo); a second call is a no-op
pub fn unlog_dose(repo: &Repository, log_id: &str) -> Result<()> {
    repo.delete_dose_log(log_id)
}

/// Whether a log exists for this medication, date and slot
pub fn is_slot_taken(
    repo: &Repository,
    medication_id: &str,
    scheduled_time: &str,
    date: NaiveDate,
) -> Result<bool> {
    Ok(logs_for_medication_on_date(repo, medication_id, date)?
        .iter()
        .any(|log| log.scheduled_time.as_deref() == Some(scheduled_time)))
}

/// Logs for one medication on or after `since`, newest first
///
/// Callers group by calendar date for history summaries.
pub fn logs_in_window(
    repo: &Repository,
    medication_id: &str,
    since: NaiveDate,
) -> Result<Vec<DoseLog>> {
    let since_ms = since
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(chrono::Local).single())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(i64::MIN);

    let mut logs: Vec<DoseLog> = repo
        .list_dose_logs()?
        .into_iter()
        .filter(|log| log.medication_id == medication_id)
        .filter(|log| log.timestamp >= since_ms)
        .collect();
    logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(logs)
}

/// Completion as (taken, expected) for one medication on one date.
///
/// Expected is the number of configured slots; taken counts distinct
/// satisfied slots, so duplicate logs and stale slot names never push
/// the ratio past expected. As-needed medications report expected 0 and
/// the raw log count.
pub fn completion_ratio(
    repo: &Repository,
    medication: &Medication,
    date: NaiveDate,
) -> Result<(usize, usize)> {
    let logs = logs_for_medication_on_date(repo, &medication.id, date)?;

    if medication.is_as_needed() {
        return Ok((logs.len(), 0));
    }

    let taken: HashSet<&str> = logs
        .iter()
        .filter_map(|log| log.scheduled_time.as_deref())
        .filter(|slot| medication.times.iter().any(|t| t == slot))
        .collect();

    Ok((taken.len(), medication.times.len()))
}
