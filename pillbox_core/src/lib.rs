#![forbid(unsafe_code)]

//! Core domain model and business logic for the Pillbox medication tracker.
//!
//! This crate provides:
//! - Domain types (people, medications, recurrence rules, dose logs)
//! - Recurrence evaluation and schedule labels
//! - Persistence (locked per-collection JSON files, typed repository)
//! - Dose tracking views
//! - Backup export/import and the reminder policy

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod store;
pub mod repo;
pub mod recurrence;
pub mod tracker;
pub mod backup;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use store::CollectionStore;
pub use repo::Repository;
pub use recurrence::{describe, is_due, medication_is_due, next_due_date};
pub use tracker::{
    completion_ratio, is_slot_taken, log_dose, logs_for_medication_on_date, logs_in_window,
    unlog_dose,
};
pub use backup::{
    build_export_document, export_history_csv, mark_backup_done, reminder_due,
    restore_from_document, snooze_reminder,
};
