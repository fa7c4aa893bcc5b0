use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use triage_core::clock::{SystemClock, parse_timer_minutes};
use triage_core::config::TrackerConfig;
use triage_core::logging::init_tracing;
use triage_core::models::{CoreError, CoreErrorKind, MutationOutcome, NewPatient, NewTask};
use triage_core::models::{PatientId, PatientStatus, TaskId};
use triage_core::notification::NotificationDispatcher;
use triage_core::orchestration::{StayTicker, TimerScheduler};
use triage_core::sqlite::SqliteKeyValueStore;
use triage_core::tracking::TrackingStore;

mod host;
mod render;

use host::TerminalNotificationHost;

/// triage - patient board with per-task countdown timers
#[derive(Parser, Debug)]
#[command(name = "triage")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite board database
    #[arg(long, env = "TRIAGE_DB", default_value = "triage.sqlite3")]
    db: PathBuf,

    /// Path to a JSON tracker configuration
    #[arg(long, env = "TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Suppress timer alerts
    #[arg(long)]
    mute: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the board
    #[command(alias = "ls")]
    List {
        /// Print the board as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a patient
    AddPatient {
        name: String,

        /// Minutes since the patient arrived
        #[arg(long, default_value = "0")]
        arrived_minutes_ago: u64,

        #[arg(long, default_value = "")]
        notes: String,

        /// Intake task, optionally with a timer: "Labs" or "Labs=30"
        #[arg(long = "task")]
        tasks: Vec<String>,
    },

    /// Add a task to a patient
    AddTask {
        patient: String,
        text: String,

        /// Countdown in minutes (1-999)
        #[arg(long)]
        timer: Option<String>,
    },

    /// Set or clear a task timer; omit MINUTES to clear
    Timer {
        patient: String,
        task: String,
        minutes: Option<String>,
    },

    /// Advance a task: incomplete -> in-progress -> complete -> incomplete
    Advance { patient: String, task: String },

    /// Acknowledge an expired timer
    Ack { patient: String, task: String },

    /// Re-arm a task timer for 15 minutes
    Snooze { patient: String, task: String },

    /// Replace patient notes
    Notes { patient: String, text: String },

    /// Replace task notes
    TaskNotes {
        patient: String,
        task: String,
        text: String,
    },

    /// Set patient status (active, admitted, discharged)
    Status { patient: String, status: String },

    RemoveTask { patient: String, task: String },

    RemovePatient { patient: String },

    /// Remove every patient
    Reset,

    /// Run timers and length-of-stay updates until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("warn");
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(error) => return fail(&error),
    };
    let key_value_store = match SqliteKeyValueStore::open(cli.db.clone()) {
        Ok(store) => store,
        Err(error) => return fail(&error),
    };

    let store = Arc::new(TrackingStore::open(
        Arc::new(key_value_store),
        Arc::new(SystemClock),
        config,
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(Arc::new(
        TerminalNotificationHost::new(cli.mute),
    )));

    if let Commands::Watch = cli.command {
        return watch(store, dispatcher).await;
    }

    let events = store.evaluate_timers();
    dispatcher.dispatch_all(&events);

    match run(&store, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => fail(&error),
    }
}

fn run(store: &TrackingStore, command: Commands) -> Result<(), CoreError> {
    match command {
        Commands::List { json } => {
            let snapshot = store.snapshot();
            let now = store.now();
            if json {
                let rendered = render::board_json(&snapshot, store.config(), now).map_err(
                    |error| CoreError::new(CoreErrorKind::Internal, error.to_string()),
                )?;
                println!("{rendered}");
            } else {
                println!("{}", render::board_text(&snapshot, store.config(), now));
            }
            Ok(())
        }
        Commands::AddPatient {
            name,
            arrived_minutes_ago,
            notes,
            tasks,
        } => {
            let arrival_time = store
                .now()
                .checked_sub(Duration::from_secs(arrived_minutes_ago.saturating_mul(60)))
                .unwrap_or_else(|| store.now());
            let new_patient = NewPatient {
                name,
                arrival_time,
                notes,
                tasks: tasks.iter().map(String::as_str).map(intake_task).collect(),
            };
            match store.add_patient(new_patient) {
                Some(id) => {
                    println!("{id}");
                    Ok(())
                }
                None => Err(invalid_input("patient name must not be blank")),
            }
        }
        Commands::AddTask {
            patient,
            text,
            timer,
        } => {
            let minutes = timer.as_deref().and_then(parse_timer_minutes);
            match store.add_task(&patient_id(&patient), &text, minutes) {
                Some(id) => {
                    println!("{id}");
                    Ok(())
                }
                None => Err(invalid_input(
                    "task not added: unknown patient or blank text",
                )),
            }
        }
        Commands::Timer {
            patient,
            task,
            minutes,
        } => {
            let minutes = minutes.as_deref().and_then(parse_timer_minutes);
            report(store.update_task_timer(&patient_id(&patient), &task_id(&task), minutes))
        }
        Commands::Advance { patient, task } => {
            report(store.advance_task_completion(&patient_id(&patient), &task_id(&task)))
        }
        Commands::Ack { patient, task } => {
            report(store.acknowledge_task_timer(&patient_id(&patient), &task_id(&task)))
        }
        Commands::Snooze { patient, task } => {
            report(store.snooze_task(&patient_id(&patient), &task_id(&task)))
        }
        Commands::Notes { patient, text } => {
            report(store.update_patient_notes(&patient_id(&patient), &text))
        }
        Commands::TaskNotes {
            patient,
            task,
            text,
        } => report(store.update_task_notes(&patient_id(&patient), &task_id(&task), &text)),
        Commands::Status { patient, status } => {
            let status: PatientStatus = status.parse().map_err(|()| {
                invalid_input(format!(
                    "unknown status '{status}'; expected active, admitted or discharged"
                ))
            })?;
            report(store.update_patient_status(&patient_id(&patient), status))
        }
        Commands::RemoveTask { patient, task } => {
            report(store.remove_task(&patient_id(&patient), &task_id(&task)))
        }
        Commands::RemovePatient { patient } => report(store.remove_patient(&patient_id(&patient))),
        Commands::Reset => report(store.clear_all()),
        Commands::Watch => Ok(()),
    }
}

async fn watch(store: Arc<TrackingStore>, dispatcher: Arc<NotificationDispatcher>) -> ExitCode {
    let scheduler = TimerScheduler::new(Arc::clone(&store), dispatcher);
    let ticker = StayTicker::new(Arc::clone(&store));
    let mut stays = ticker.subscribe();
    let mut board = store.subscribe();

    scheduler.start();
    ticker.start();
    println!(
        "{}",
        render::board_text(&store.snapshot(), store.config(), store.now())
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    tracing::error!(message = %error, "failed to listen for interrupt");
                }
                break;
            }
            changed = board.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = board.borrow_and_update().clone();
                println!("{}", render::board_text(&snapshot, store.config(), store.now()));
            }
            changed = stays.changed() => {
                if changed.is_err() {
                    break;
                }
                for stay in stays.borrow_and_update().iter() {
                    println!(
                        "{}  {}  {} ({})",
                        stay.patient_id,
                        stay.patient_name,
                        stay.length_of_stay,
                        stay.band.as_str()
                    );
                }
            }
        }
    }

    ticker.stop();
    scheduler.shutdown();
    let health = store.persistence_health();
    if health.degraded {
        eprintln!(
            "warning: the last {} saves failed; recent changes were not persisted",
            health.consecutive_failures
        );
    }
    ExitCode::SUCCESS
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackerConfig, CoreError> {
    let Some(path) = path else {
        return Ok(TrackerConfig::default());
    };
    let raw = std::fs::read_to_string(path).map_err(|error| {
        CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("failed to read config '{}': {error}", path.display()),
        )
    })?;
    TrackerConfig::from_json_str(&raw)
}

/// "Labs=30" carries a timer; anything after the last '=' that is not a number
/// is treated as part of the text.
fn intake_task(raw: &str) -> NewTask {
    let timed = raw.rsplit_once('=').and_then(|(text, minutes)| {
        parse_timer_minutes(minutes).map(|minutes| (text, minutes))
    });
    match timed {
        Some((text, minutes)) => NewTask::new(text.trim(), Some(minutes)),
        None => NewTask::new(raw.trim(), None),
    }
}

fn report(outcome: MutationOutcome) -> Result<(), CoreError> {
    match outcome {
        MutationOutcome::Applied => Ok(()),
        MutationOutcome::Unchanged => {
            println!("nothing to change");
            Ok(())
        }
        MutationOutcome::NotFound => {
            eprintln!("no matching patient or task");
            Ok(())
        }
        MutationOutcome::Rejected => {
            eprintln!("request ignored");
            Ok(())
        }
    }
}

fn patient_id(raw: &str) -> PatientId {
    PatientId::from(raw)
}

fn task_id(raw: &str) -> TaskId {
    TaskId::from(raw)
}

fn invalid_input(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}

fn fail(error: &CoreError) -> ExitCode {
    eprintln!("error: {}", error.message);
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use triage_core::models::NewTask;

    use super::intake_task;

    #[test]
    fn intake_tasks_split_on_the_last_numeric_suffix() {
        assert_eq!(intake_task("Labs=30"), NewTask::new("Labs", Some(30)));
        assert_eq!(intake_task(" CT head "), NewTask::new("CT head", None));
        assert_eq!(intake_task("a=b"), NewTask::new("a=b", None));
        assert_eq!(intake_task("K=4.1=15"), NewTask::new("K=4.1", Some(15)));
    }
}
