//! Core domain types for the Pillbox medication tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - People and the medications they take
//! - Recurrence rules (including the legacy bare `days` representation)
//! - Dose logs and settings
//! - The export/import snapshot document
//!
//! All wire names are camelCase so persisted collections and export
//! documents keep the shape described in the storage contract
//! (`personId`, `scheduledTime`, `doseLogs`, ...).

use chrono::{Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Person
// ============================================================================

/// A person medications belong to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub name: String,
}

impl Person {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
        }
    }
}

// ============================================================================
// Recurrence
// ============================================================================

/// How often a medication is taken
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Scheduled,
    AsNeeded,
}

/// A recurrence rule: which calendar dates a medication is due.
///
/// Internally tagged so the persisted shape is `{"type": "weekly", ...}`.
/// Day-of-week numbering is 0=Sunday..6=Saturday. Unknown tags
/// deserialize to `Daily`: corrupted rules degrade to "always due"
/// instead of failing the whole record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Recurrence {
    /// Due on specific days of the week; an empty set means every day
    #[serde(rename_all = "camelCase")]
    Weekly {
        #[serde(default)]
        days: Vec<u8>,
    },
    /// Due on specific weekdays every `n` weeks, cycle anchored to the
    /// Monday of the week containing `anchor` (epoch ms)
    #[serde(rename_all = "camelCase")]
    EveryNWeeks {
        #[serde(default = "default_interval")]
        n: u32,
        #[serde(default)]
        days: Vec<u8>,
        #[serde(default)]
        anchor: i64,
    },
    /// Due on a fixed day of the month, clamped to shorter months,
    /// with a one-day window either side
    #[serde(rename_all = "camelCase")]
    MonthlyByDate { day_of_month: u8 },
    /// Due on the nth (1..4) or last (-1) given weekday of the month
    #[serde(rename_all = "camelCase")]
    MonthlyByWeekday { week: i8, dow: u8 },
    /// Due every day; also the fallback for unrecognized rule shapes
    #[serde(other)]
    Daily,
}

fn default_interval() -> u32 {
    1
}

/// Lenient decoding for the `recurrence` field.
///
/// Unknown tags already degrade through `#[serde(other)]`, but a rule
/// that is not a tagged object at all (a number, `{}`, a known tag with
/// mangled fields) would otherwise fail the whole medication record.
/// Any shape that does not decode becomes `Daily`; explicit null stays
/// `None` so the legacy `days` migration still applies.
fn recurrence_or_daily<'de, D>(deserializer: D) -> std::result::Result<Option<Recurrence>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(value) => Some(serde_json::from_value(value).unwrap_or(Recurrence::Daily)),
    })
}

// ============================================================================
// Medication
// ============================================================================

/// A tracked medication
///
/// `days` is the legacy weekly representation predating tagged
/// recurrence rules. It is kept on the record and re-exported verbatim;
/// only `effective_recurrence()` interprets it. Nothing rewrites the
/// stored shape.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub person_id: String,
    pub name: String,
    pub dosage: String,
    #[serde(default)]
    pub frequency: Frequency,
    /// Scheduled dose slots as HH:MM (24h); empty for as-needed
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default, deserialize_with = "recurrence_or_daily")]
    pub recurrence: Option<Recurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub sort_order: i64,
    /// Legacy weekly day array (0=Sun..6=Sat), migrated at read time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<u8>>,
}

impl Medication {
    /// Create a scheduled medication with the given dose slots
    pub fn new(
        person_id: impl Into<String>,
        name: impl Into<String>,
        dosage: impl Into<String>,
        times: Vec<String>,
        recurrence: Option<Recurrence>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            person_id: person_id.into(),
            name: name.into(),
            dosage: dosage.into(),
            frequency: Frequency::Scheduled,
            times,
            recurrence,
            notes: None,
            created_at: now_ms(),
            sort_order: 0,
            days: None,
        }
    }

    /// Create an as-needed medication (no dose slots, no recurrence)
    pub fn new_as_needed(
        person_id: impl Into<String>,
        name: impl Into<String>,
        dosage: impl Into<String>,
    ) -> Self {
        Self {
            frequency: Frequency::AsNeeded,
            ..Self::new(person_id, name, dosage, Vec::new(), None)
        }
    }

    pub fn is_as_needed(&self) -> bool {
        self.frequency == Frequency::AsNeeded
    }

    /// Resolve the recurrence rule, migrating the legacy representation.
    ///
    /// One-way, read-time only: a bare non-empty `days` array becomes
    /// `Weekly`, anything else without a tagged rule becomes `Daily`.
    pub fn effective_recurrence(&self) -> Recurrence {
        if let Some(rule) = &self.recurrence {
            return rule.clone();
        }
        match &self.days {
            Some(days) if !days.is_empty() => Recurrence::Weekly { days: days.clone() },
            _ => Recurrence::Daily,
        }
    }
}

// ============================================================================
// Dose logs
// ============================================================================

/// A timestamped record that a dose was taken
///
/// `scheduled_time` is the HH:MM slot satisfied for a scheduled
/// medication, or None for an as-needed dose.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoseLog {
    pub id: String,
    pub medication_id: String,
    pub scheduled_time: Option<String>,
    /// Epoch ms; the local calendar date of this instant decides which
    /// day the dose counts against
    pub timestamp: i64,
}

impl DoseLog {
    pub fn new(medication_id: impl Into<String>, scheduled_time: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            medication_id: medication_id.into(),
            scheduled_time,
            timestamp: now_ms(),
        }
    }

    /// Local calendar date this log falls on
    pub fn local_date(&self) -> Option<NaiveDate> {
        local_date_of_ms(self.timestamp)
    }
}

// ============================================================================
// Settings
// ============================================================================

/// A flat key/value setting record, keyed by the setting name
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub id: String,
    pub value: Value,
}

/// Setting keys consumed and produced by the core
pub mod setting_keys {
    pub const HAS_SEEN_WELCOME: &str = "hasSeenWelcome";
    pub const BACKUP_REMINDER: &str = "backupReminder";
    pub const LAST_BACKUP: &str = "lastBackup";
    pub const LAST_BACKUP_REMINDER: &str = "lastBackupReminder";
}

// ============================================================================
// Snapshot
// ============================================================================

/// The full exportable/importable dataset
///
/// `doseLogs` is optional on import and treated as empty when absent.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub dose_logs: Vec<DoseLog>,
}

// ============================================================================
// Time helpers
// ============================================================================

/// Current instant as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert epoch milliseconds to the device-local calendar date
pub fn local_date_of_ms(ms: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.date_naive())
}
