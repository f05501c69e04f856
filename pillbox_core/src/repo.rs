//! Domain-typed repository over the collection store.
//!
//! Exposes People, Medications, DoseLogs and Settings with cascade
//! deletes and whole-dataset snapshot export/import. Cascades are
//! best-effort multi-step operations: there is no cross-collection
//! transaction, so an interruption between the parent and child deletes
//! can leave orphans. `sweep_orphans` is the reconciliation pass.

use crate::recurrence::medication_is_due;
use crate::store::CollectionStore;
use crate::types::{DoseLog, Medication, Person, Setting, Snapshot};
use crate::Result;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

const PEOPLE: &str = "people";
const MEDICATIONS: &str = "medications";
const DOSE_LOGS: &str = "doseLogs";
const SETTINGS: &str = "settings";

/// Typed façade over the collection store
///
/// Stateless between calls apart from the storage handle it owns.
pub struct Repository {
    store: CollectionStore,
}

impl Repository {
    /// Open the repository, running storage setup and enforcing the
    /// default-person invariant: an empty people collection gains a
    /// persisted "Me" person before control returns to the caller.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let store = CollectionStore::open(dir.as_ref())?;
        let repo = Self { store };
        repo.ensure_default_person()?;
        Ok(repo)
    }

    fn ensure_default_person(&self) -> Result<()> {
        if self.list_people()?.is_empty() {
            let me = Person::new("Me");
            tracing::info!("No people found, creating default person '{}'", me.name);
            self.add_person(&me)?;
        }
        Ok(())
    }

    /// Decode records, skipping (and warning about) any that no longer
    /// parse rather than failing the whole listing
    fn decode_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let records = self.store.list(collection)?;
        let mut decoded = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<T>(record) {
                Ok(value) => decoded.push(value),
                Err(e) => {
                    tracing::warn!("Skipping undecodable record in '{}': {}", collection, e);
                }
            }
        }
        Ok(decoded)
    }

    fn insert_record<T: Serialize>(&self, collection: &str, id: &str, record: &T) -> Result<()> {
        self.store
            .insert(collection, id, serde_json::to_value(record)?)
    }

    fn put_record<T: Serialize>(&self, collection: &str, id: &str, record: &T) -> Result<()> {
        self.store.put(collection, id, serde_json::to_value(record)?)
    }

    // ------------------------------------------------------------------
    // People
    // ------------------------------------------------------------------

    pub fn list_people(&self) -> Result<Vec<Person>> {
        self.decode_all(PEOPLE)
    }

    pub fn add_person(&self, person: &Person) -> Result<()> {
        self.insert_record(PEOPLE, &person.id, person)
    }

    /// Delete a person and cascade to their medications (and, through
    /// the medication delete path, their dose logs).
    ///
    /// Returns the number of medications removed.
    pub fn delete_person(&self, id: &str) -> Result<usize> {
        self.store.remove(PEOPLE, id)?;

        let owned: Vec<Medication> = self
            .list_medications()?
            .into_iter()
            .filter(|m| m.person_id == id)
            .collect();

        let mut removed = 0;
        for medication in &owned {
            self.delete_medication(&medication.id)?;
            removed += 1;
        }

        tracing::debug!("Deleted person {} and {} medication(s)", id, removed);
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Medications
    // ------------------------------------------------------------------

    /// All medications, ordered by sort order then creation time
    pub fn list_medications(&self) -> Result<Vec<Medication>> {
        let mut medications: Vec<Medication> = self.decode_all(MEDICATIONS)?;
        medications.sort_by_key(|m| (m.sort_order, m.created_at));
        Ok(medications)
    }

    pub fn add_medication(&self, medication: &Medication) -> Result<()> {
        self.insert_record(MEDICATIONS, &medication.id, medication)
    }

    pub fn update_medication(&self, medication: &Medication) -> Result<()> {
        self.put_record(MEDICATIONS, &medication.id, medication)
    }

    /// Delete a medication and cascade to its dose logs.
    ///
    /// Returns the number of logs removed.
    pub fn delete_medication(&self, id: &str) -> Result<usize> {
        self.store.remove(MEDICATIONS, id)?;

        let orphaned: Vec<DoseLog> = self
            .list_dose_logs()?
            .into_iter()
            .filter(|log| log.medication_id == id)
            .collect();

        for log in &orphaned {
            self.store.remove(DOSE_LOGS, &log.id)?;
        }

        tracing::debug!(
            "Deleted medication {} and {} dose log(s)",
            id,
            orphaned.len()
        );
        Ok(orphaned.len())
    }

    /// Scheduled medications due on `date`, optionally for one person
    pub fn due_medications(
        &self,
        person_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<Vec<Medication>> {
        Ok(self
            .list_medications()?
            .into_iter()
            .filter(|m| !m.is_as_needed())
            .filter(|m| person_id.map_or(true, |p| m.person_id == p))
            .filter(|m| medication_is_due(m, date))
            .collect())
    }

    // ------------------------------------------------------------------
    // Dose logs
    // ------------------------------------------------------------------

    pub fn list_dose_logs(&self) -> Result<Vec<DoseLog>> {
        self.decode_all(DOSE_LOGS)
    }

    pub fn add_dose_log(&self, log: &DoseLog) -> Result<()> {
        self.insert_record(DOSE_LOGS, &log.id, log)
    }

    /// Remove a dose log; idempotent when already absent
    pub fn delete_dose_log(&self, id: &str) -> Result<()> {
        self.store.remove(DOSE_LOGS, id)
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        match self.store.get(SETTINGS, key)? {
            Some(record) => Ok(serde_json::from_value::<Setting>(record)
                .ok()
                .map(|s| s.value)),
            None => Ok(None),
        }
    }

    pub fn put_setting(&self, key: &str, value: Value) -> Result<()> {
        let setting = Setting {
            id: key.to_string(),
            value,
        };
        self.put_record(SETTINGS, key, &setting)
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// The full dataset as an export document
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            people: self.list_people()?,
            medications: self.list_medications()?,
            dose_logs: self.list_dose_logs()?,
        })
    }

    /// Destructive import: clears people, medications and dose logs,
    /// then inserts every record from the snapshot. There is no merge
    /// mode. Document validation happens before this is called.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.store.clear(PEOPLE)?;
        self.store.clear(MEDICATIONS)?;
        self.store.clear(DOSE_LOGS)?;

        for person in &snapshot.people {
            self.insert_record(PEOPLE, &person.id, person)?;
        }
        for medication in &snapshot.medications {
            self.insert_record(MEDICATIONS, &medication.id, medication)?;
        }
        for log in &snapshot.dose_logs {
            self.insert_record(DOSE_LOGS, &log.id, log)?;
        }

        tracing::info!(
            "Imported snapshot: {} people, {} medications, {} dose logs",
            snapshot.people.len(),
            snapshot.medications.len(),
            snapshot.dose_logs.len()
        );
        self.ensure_default_person()
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Remove medications whose person no longer exists and dose logs
    /// whose medication no longer exists.
    ///
    /// Returns (medications removed, logs removed). This is the
    /// periodic mitigation for cascades interrupted between their two
    /// storage calls.
    pub fn sweep_orphans(&self) -> Result<(usize, usize)> {
        let person_ids: HashSet<String> =
            self.list_people()?.into_iter().map(|p| p.id).collect();

        let mut swept_medications = 0;
        for medication in self.list_medications()? {
            if !person_ids.contains(&medication.person_id) {
                tracing::warn!(
                    "Sweeping orphaned medication {} ({})",
                    medication.id,
                    medication.name
                );
                self.store.remove(MEDICATIONS, &medication.id)?;
                swept_medications += 1;
            }
        }

        let medication_ids: HashSet<String> = self
            .list_medications()?
            .into_iter()
            .map(|m| m.id)
            .collect();

        let mut swept_logs = 0;
        for log in self.list_dose_logs()? {
            if !medication_ids.contains(&log.medication_id) {
                self.store.remove(DOSE_LOGS, &log.id)?;
                swept_logs += 1;
            }
        }

        if swept_medications > 0 || swept_logs > 0 {
            tracing::info!(
                "Sweep removed {} medication(s), {} log(s)",
                swept_medications,
                swept_logs
            );
        }
        Ok((swept_medications, swept_logs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_repo(dir: &tempfile::TempDir) -> Repository {
        Repository::open(dir.path()).unwrap()
    }

    fn sample_medication(person_id: &str, name: &str) -> Medication {
        Medication::new(
            person_id,
            name,
            "1 tablet",
            vec!["08:00".into(), "20:00".into()],
            Some(crate::Recurrence::Daily),
        )
    }

    #[test]
    fn test_default_person_created_on_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        let people = repo.list_people().unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "Me");

        // Reopening must not create a second one
        drop(repo);
        let repo = open_repo(&temp_dir);
        assert_eq!(repo.list_people().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_person_cascades_to_medications_and_logs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        let person = Person::new("Mom");
        repo.add_person(&person).unwrap();

        let med = sample_medication(&person.id, "Lisinopril");
        repo.add_medication(&med).unwrap();
        repo.add_dose_log(&DoseLog::new(&med.id, Some("08:00".into())))
            .unwrap();

        let kept = sample_medication("someone-else", "Aspirin");
        repo.add_medication(&kept).unwrap();

        let removed = repo.delete_person(&person.id).unwrap();
        assert_eq!(removed, 1);

        let medications = repo.list_medications().unwrap();
        assert_eq!(medications.len(), 1);
        assert_eq!(medications[0].name, "Aspirin");
        assert!(repo.list_dose_logs().unwrap().is_empty());
    }

    #[test]
    fn test_delete_medication_cascades_to_logs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        let med = sample_medication("p1", "Lisinopril");
        repo.add_medication(&med).unwrap();
        repo.add_dose_log(&DoseLog::new(&med.id, Some("08:00".into())))
            .unwrap();
        repo.add_dose_log(&DoseLog::new(&med.id, None)).unwrap();

        let other_log = DoseLog::new("other-med", None);
        repo.add_dose_log(&other_log).unwrap();

        let removed = repo.delete_medication(&med.id).unwrap();
        assert_eq!(removed, 2);

        let logs = repo.list_dose_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, other_log.id);
    }

    #[test]
    fn test_medications_sorted_by_sort_order_then_created() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        let mut first = sample_medication("p1", "B");
        first.sort_order = 1;
        first.created_at = 100;
        let mut second = sample_medication("p1", "A");
        second.sort_order = 0;
        second.created_at = 200;

        repo.add_medication(&first).unwrap();
        repo.add_medication(&second).unwrap();

        let names: Vec<_> = repo
            .list_medications()
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        let person = Person::new("Mom");
        repo.add_person(&person).unwrap();
        let med = sample_medication(&person.id, "Lisinopril");
        repo.add_medication(&med).unwrap();
        let log = DoseLog::new(&med.id, Some("08:00".into()));
        repo.add_dose_log(&log).unwrap();

        let snapshot = repo.export_snapshot().unwrap();
        repo.import_snapshot(&snapshot).unwrap();
        let restored = repo.export_snapshot().unwrap();

        // Order-insensitive value equality for collections
        let ids = |people: &[Person]| {
            let mut v: Vec<_> = people.iter().map(|p| p.id.clone()).collect();
            v.sort();
            v
        };
        assert_eq!(ids(&snapshot.people), ids(&restored.people));
        assert_eq!(restored.medications, snapshot.medications);
        assert_eq!(restored.dose_logs, vec![log]);
        // times stays order-sensitive within a medication
        assert_eq!(restored.medications[0].times, vec!["08:00", "20:00"]);
    }

    #[test]
    fn test_import_is_destructive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        repo.add_medication(&sample_medication("p1", "Old")).unwrap();

        let person = Person::new("Fresh");
        let snapshot = Snapshot {
            people: vec![person.clone()],
            medications: vec![sample_medication(&person.id, "New")],
            dose_logs: vec![],
        };
        repo.import_snapshot(&snapshot).unwrap();

        let medications = repo.list_medications().unwrap();
        assert_eq!(medications.len(), 1);
        assert_eq!(medications[0].name, "New");
        let people = repo.list_people().unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "Fresh");
    }

    #[test]
    fn test_import_empty_people_recreates_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        repo.import_snapshot(&Snapshot::default()).unwrap();
        let people = repo.list_people().unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "Me");
    }

    #[test]
    fn test_settings_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        assert!(repo
            .get_setting(crate::setting_keys::BACKUP_REMINDER)
            .unwrap()
            .is_none());

        repo.put_setting(crate::setting_keys::BACKUP_REMINDER, json!(true))
            .unwrap();
        assert_eq!(
            repo.get_setting(crate::setting_keys::BACKUP_REMINDER)
                .unwrap(),
            Some(json!(true))
        );

        // Settings are upserts, never duplicate-key failures
        repo.put_setting(crate::setting_keys::BACKUP_REMINDER, json!(false))
            .unwrap();
        assert_eq!(
            repo.get_setting(crate::setting_keys::BACKUP_REMINDER)
                .unwrap(),
            Some(json!(false))
        );
    }

    #[test]
    fn test_due_medications_filters_person_and_frequency() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        let daily = sample_medication("p1", "Daily");
        repo.add_medication(&daily).unwrap();

        let mut weekly = sample_medication("p1", "MondayOnly");
        weekly.recurrence = Some(crate::Recurrence::Weekly { days: vec![1] });
        repo.add_medication(&weekly).unwrap();

        let prn = Medication::new_as_needed("p1", "Ibuprofen", "200mg");
        repo.add_medication(&prn).unwrap();

        let other = sample_medication("p2", "Other");
        repo.add_medication(&other).unwrap();

        // 2024-01-02 is a Tuesday
        let tuesday = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let due = repo.due_medications(Some("p1"), tuesday).unwrap();
        let names: Vec<_> = due.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Daily"]);

        let all_due = repo.due_medications(None, tuesday).unwrap();
        assert_eq!(all_due.len(), 2);
    }

    #[test]
    fn test_corrupt_recurrence_record_survives_listing() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        // A stored record whose rule is not a tagged object at all
        repo.store
            .insert(
                MEDICATIONS,
                "m1",
                json!({
                    "id": "m1",
                    "personId": "p1",
                    "name": "Mangled",
                    "dosage": "5mg",
                    "frequency": "scheduled",
                    "times": ["08:00"],
                    "recurrence": 5,
                    "createdAt": 0,
                    "sortOrder": 0
                }),
            )
            .unwrap();

        // The medication keeps appearing in listings and due evaluation
        // with a Daily rule instead of being dropped
        let listed = repo.list_medications().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Mangled");
        assert_eq!(
            listed[0].effective_recurrence(),
            crate::Recurrence::Daily
        );

        let due = repo
            .due_medications(None, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .unwrap();
        assert_eq!(due.len(), 1);

        // Export still carries the record
        let snapshot = repo.export_snapshot().unwrap();
        assert_eq!(snapshot.medications.len(), 1);
    }

    #[test]
    fn test_sweep_orphans() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&temp_dir);

        let person = Person::new("Mom");
        repo.add_person(&person).unwrap();
        let kept = sample_medication(&person.id, "Kept");
        repo.add_medication(&kept).unwrap();
        let kept_log = DoseLog::new(&kept.id, None);
        repo.add_dose_log(&kept_log).unwrap();

        // Simulate an interrupted cascade: children without parents
        repo.add_medication(&sample_medication("gone-person", "Orphan"))
            .unwrap();
        repo.add_dose_log(&DoseLog::new("gone-med", None)).unwrap();

        let (medications, logs) = repo.sweep_orphans().unwrap();
        assert_eq!((medications, logs), (1, 1));

        assert_eq!(repo.list_medications().unwrap().len(), 1);
        let remaining = repo.list_dose_logs().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept_log.id);
    }
}
