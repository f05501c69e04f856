use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use pillbox_core::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pillbox")]
#[command(about = "Medication schedule and dose tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show medications due on a date (default)
    Due {
        /// Date to evaluate (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,

        /// Restrict to one person by name
        #[arg(long)]
        person: Option<String>,
    },

    /// Log a dose for a medication
    Log {
        /// Medication name or id
        medication: String,

        /// Scheduled slot (HH:MM); defaults to the first untaken slot
        #[arg(long)]
        time: Option<String>,
    },

    /// Undo a dose log by id
    Unlog {
        log_id: String,
    },

    /// Show dose history
    History {
        /// Medication name or id (all medications if omitted)
        medication: Option<String>,

        /// Window size in days
        #[arg(long, default_value_t = 7)]
        days: i64,

        /// Write the window as CSV instead of printing
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// List people
    People,

    /// Add a person
    AddPerson {
        name: String,
    },

    /// Remove a person and their medications
    RemovePerson {
        name: String,
    },

    /// Add a medication
    AddMed {
        name: String,

        #[arg(long, default_value = "")]
        dosage: String,

        /// Owning person by name (defaults to the first person)
        #[arg(long)]
        person: Option<String>,

        /// Scheduled slot (HH:MM), repeatable
        #[arg(long = "time")]
        times: Vec<String>,

        /// Due day of week (0=Sun..6=Sat), repeatable; omitted means daily
        #[arg(long = "day")]
        days: Vec<u8>,

        /// As-needed medication (no slots, no schedule)
        #[arg(long, conflicts_with_all = ["times", "days"])]
        as_needed: bool,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Remove a medication and its dose logs
    RemoveMed {
        name: String,
    },

    /// Export the full dataset as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Replace the full dataset from an export file
    Import {
        file: PathBuf,
    },

    /// Remove orphaned medications and dose logs
    Sweep,

    /// Snooze the backup reminder
    Snooze,
}

fn main() -> Result<()> {
    pillbox_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let repo = Repository::open(&data_dir)?;

    match cli.command {
        Some(Commands::Due { date, person }) => cmd_due(&repo, &config, date, person),
        Some(Commands::Log { medication, time }) => cmd_log(&repo, &medication, time),
        Some(Commands::Unlog { log_id }) => cmd_unlog(&repo, &log_id),
        Some(Commands::History {
            medication,
            days,
            csv,
        }) => cmd_history(&repo, medication, days, csv),
        Some(Commands::People) => cmd_people(&repo),
        Some(Commands::AddPerson { name }) => cmd_add_person(&repo, &name),
        Some(Commands::RemovePerson { name }) => cmd_remove_person(&repo, &name),
        Some(Commands::AddMed {
            name,
            dosage,
            person,
            times,
            days,
            as_needed,
            notes,
        }) => cmd_add_med(&repo, name, dosage, person, times, days, as_needed, notes),
        Some(Commands::RemoveMed { name }) => cmd_remove_med(&repo, &name),
        Some(Commands::Export { out }) => cmd_export(&repo, out),
        Some(Commands::Import { file }) => cmd_import(&repo, &file),
        Some(Commands::Sweep) => cmd_sweep(&repo),
        Some(Commands::Snooze) => cmd_snooze(&repo),
        None => cmd_due(&repo, &config, None, None),
    }
}

fn parse_date(arg: Option<String>) -> Result<NaiveDate> {
    match arg {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|e| Error::Other(format!("Invalid date '{}': {}", s, e))),
        None => Ok(Local::now().date_naive()),
    }
}

fn find_person(repo: &Repository, name: &str) -> Result<Person> {
    repo.list_people()?
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::Other(format!("No person named '{}'", name)))
}

fn find_medication(repo: &Repository, name_or_id: &str) -> Result<Medication> {
    repo.list_medications()?
        .into_iter()
        .find(|m| m.id == name_or_id || m.name.eq_ignore_ascii_case(name_or_id))
        .ok_or_else(|| Error::Other(format!("No medication named '{}'", name_or_id)))
}

fn cmd_due(
    repo: &Repository,
    config: &Config,
    date: Option<String>,
    person: Option<String>,
) -> Result<()> {
    let date = parse_date(date)?;
    let person_id = match &person {
        Some(name) => Some(find_person(repo, name)?.id),
        None => None,
    };

    let due = repo.due_medications(person_id.as_deref(), date)?;
    if due.is_empty() {
        println!("Nothing scheduled for {}.", date);
    } else {
        println!("Due on {}:", date);
        for med in &due {
            let (taken, expected) = completion_ratio(repo, med, date)?;
            let mut slots = Vec::new();
            for slot in &med.times {
                let mark = if is_slot_taken(repo, &med.id, slot, date)? {
                    "x"
                } else {
                    " "
                };
                slots.push(format!("[{}] {}", mark, slot));
            }
            println!(
                "  {} {} — {}  {}  ({}/{})",
                med.name,
                med.dosage,
                describe(med),
                slots.join(" "),
                taken,
                expected
            );
        }
    }

    let as_needed: Vec<Medication> = repo
        .list_medications()?
        .into_iter()
        .filter(|m| m.is_as_needed())
        .filter(|m| person_id.as_deref().map_or(true, |p| m.person_id == p))
        .collect();
    if !as_needed.is_empty() {
        println!("As needed:");
        for med in &as_needed {
            let (count, _) = completion_ratio(repo, med, date)?;
            println!("  {} {} — {} taken today", med.name, med.dosage, count);
        }
    }

    if reminder_due(repo, now_ms(), config.backup.reminder_interval_days)? {
        println!();
        println!("! Backup reminder: run 'pillbox export' or 'pillbox snooze'.");
    }

    Ok(())
}

fn cmd_log(repo: &Repository, medication: &str, time: Option<String>) -> Result<()> {
    let med = find_medication(repo, medication)?;
    let today = Local::now().date_naive();

    let slot = if med.is_as_needed() {
        None
    } else {
        match time {
            Some(t) => {
                // The tracker trusts its caller, so validate the slot here
                if !med.times.iter().any(|s| *s == t) {
                    return Err(Error::Other(format!(
                        "'{}' is not a configured slot for {} (slots: {})",
                        t,
                        med.name,
                        med.times.join(", ")
                    )));
                }
                Some(t)
            }
            None => {
                let mut next_open = None;
                for slot in &med.times {
                    if !is_slot_taken(repo, &med.id, slot, today)? {
                        next_open = Some(slot.clone());
                        break;
                    }
                }
                match next_open {
                    Some(slot) => Some(slot),
                    None => {
                        println!("All slots for {} already logged today.", med.name);
                        return Ok(());
                    }
                }
            }
        }
    };

    let log = log_dose(repo, &med.id, slot)?;
    match &log.scheduled_time {
        Some(slot) => println!("✓ Logged {} ({}) [{}]", med.name, slot, log.id),
        None => println!("✓ Logged {} (as needed) [{}]", med.name, log.id),
    }
    Ok(())
}

fn cmd_unlog(repo: &Repository, log_id: &str) -> Result<()> {
    unlog_dose(repo, log_id)?;
    println!("✓ Removed dose log {}", log_id);
    Ok(())
}

fn cmd_history(
    repo: &Repository,
    medication: Option<String>,
    days: i64,
    csv: Option<PathBuf>,
) -> Result<()> {
    let since = Local::now().date_naive() - Duration::days(days);

    if let Some(path) = csv {
        let count = export_history_csv(repo, &path, since)?;
        println!("✓ Wrote {} history rows to {}", count, path.display());
        return Ok(());
    }

    let medications = match medication {
        Some(name) => vec![find_medication(repo, &name)?],
        None => repo.list_medications()?,
    };

    for med in &medications {
        let logs = logs_in_window(repo, &med.id, since)?;
        if logs.is_empty() {
            continue;
        }
        println!("{} — {}", med.name, describe(med));

        // Group by local calendar date, newest date first
        let mut by_date: BTreeMap<NaiveDate, Vec<&DoseLog>> = BTreeMap::new();
        for log in &logs {
            if let Some(date) = log.local_date() {
                by_date.entry(date).or_default().push(log);
            }
        }
        for (date, entries) in by_date.iter().rev() {
            let slots: Vec<String> = entries
                .iter()
                .map(|log| {
                    log.scheduled_time
                        .clone()
                        .unwrap_or_else(|| "as needed".into())
                })
                .collect();
            println!("  {}: {}", date, slots.join(", "));
        }
    }
    Ok(())
}

fn cmd_people(repo: &Repository) -> Result<()> {
    for person in repo.list_people()? {
        let count = repo
            .list_medications()?
            .iter()
            .filter(|m| m.person_id == person.id)
            .count();
        println!("{} — {} medication(s)  [{}]", person.name, count, person.id);
    }
    Ok(())
}

fn cmd_add_person(repo: &Repository, name: &str) -> Result<()> {
    let person = Person::new(name);
    repo.add_person(&person)?;
    println!("✓ Added person {}", person.name);
    Ok(())
}

fn cmd_remove_person(repo: &Repository, name: &str) -> Result<()> {
    let person = find_person(repo, name)?;
    let removed = repo.delete_person(&person.id)?;
    println!(
        "✓ Removed {} and {} medication(s)",
        person.name, removed
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_add_med(
    repo: &Repository,
    name: String,
    dosage: String,
    person: Option<String>,
    times: Vec<String>,
    days: Vec<u8>,
    as_needed: bool,
    notes: Option<String>,
) -> Result<()> {
    let person = match person {
        Some(name) => find_person(repo, &name)?,
        None => repo
            .list_people()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Other("No people exist".into()))?,
    };

    let mut med = if as_needed {
        Medication::new_as_needed(&person.id, &name, &dosage)
    } else {
        let recurrence = if days.is_empty() {
            Some(Recurrence::Daily)
        } else {
            Some(Recurrence::Weekly { days })
        };
        let times = if times.is_empty() {
            vec!["08:00".into()]
        } else {
            times
        };
        Medication::new(&person.id, &name, &dosage, times, recurrence)
    };
    med.notes = notes;

    repo.add_medication(&med)?;
    println!("✓ Added {} for {} — {}", med.name, person.name, describe(&med));
    Ok(())
}

fn cmd_remove_med(repo: &Repository, name: &str) -> Result<()> {
    let med = find_medication(repo, name)?;
    let removed = repo.delete_medication(&med.id)?;
    println!("✓ Removed {} and {} dose log(s)", med.name, removed);
    Ok(())
}

fn cmd_export(repo: &Repository, out: Option<PathBuf>) -> Result<()> {
    let document = build_export_document(repo)?;
    let json = serde_json::to_string_pretty(&document)?;

    match out {
        Some(path) => {
            std::fs::write(&path, json)?;
            mark_backup_done(repo, now_ms())?;
            println!(
                "✓ Exported {} people, {} medications, {} dose logs to {}",
                document.people.len(),
                document.medications.len(),
                document.dose_logs.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_import(repo: &Repository, file: &PathBuf) -> Result<()> {
    let contents = std::fs::read_to_string(file)?;
    let document: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| Error::MalformedImport(format!("not valid JSON: {}", e)))?;

    let snapshot = restore_from_document(repo, &document)?;
    println!(
        "✓ Imported {} people, {} medications, {} dose logs",
        snapshot.people.len(),
        snapshot.medications.len(),
        snapshot.dose_logs.len()
    );
    Ok(())
}

fn cmd_sweep(repo: &Repository) -> Result<()> {
    let (medications, logs) = repo.sweep_orphans()?;
    println!(
        "✓ Swept {} orphaned medication(s), {} orphaned log(s)",
        medications, logs
    );
    Ok(())
}

fn cmd_snooze(repo: &Repository) -> Result<()> {
    snooze_reminder(repo, now_ms())?;
    println!("✓ Backup reminder snoozed");
    Ok(())
}
