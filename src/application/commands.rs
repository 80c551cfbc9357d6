use crate::application::bootstrap::bootstrap_workspace;
use crate::application::notifier::TimerNotifier;
use crate::application::reconcile::{complete_block, reconcile};
use crate::application::scheduler::Ticker;
use crate::domain::models::{
    clamp_minutes, format_clock, progress_percent, HistoryEntry, Settings, TimerMode, TimerState,
    BREAK_MINUTES_MAX, BREAK_MINUTES_MIN, FOCUS_MINUTES_MAX, FOCUS_MINUTES_MIN,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::SqliteKeyValueStore;
use crate::infrastructure::repository::TimerRepository;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AppState {
    engine: Arc<TimerEngine>,
}

impl AppState {
    pub fn new(
        workspace_root: PathBuf,
        notifier: Arc<dyn TimerNotifier>,
    ) -> Result<Self, InfraError> {
        Ok(Self {
            engine: Arc::new(TimerEngine::new(workspace_root, notifier)?),
        })
    }

    pub fn engine(&self) -> &Arc<TimerEngine> {
        &self.engine
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.engine.log_error(command, &error.to_string());
        error.to_string()
    }
}

pub struct TimerEngine {
    database_path: PathBuf,
    logs_dir: PathBuf,
    repository: TimerRepository,
    notifier: Arc<dyn TimerNotifier>,
    ticker: Ticker,
    // Serializes the read-modify-persist transactions; every mutation
    // re-reads from the store first so out-of-band edits are observed.
    op_guard: Mutex<()>,
    log_guard: Mutex<()>,
}

impl TimerEngine {
    pub fn new(
        workspace_root: PathBuf,
        notifier: Arc<dyn TimerNotifier>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let repository = TimerRepository::new(Arc::new(SqliteKeyValueStore::new(
            &bootstrap.database_path,
        )));

        Ok(Self {
            database_path: bootstrap.database_path,
            logs_dir: workspace_root.join("logs"),
            repository,
            notifier,
            ticker: Ticker::new(),
            op_guard: Mutex::new(()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn database_path(&self) -> &PathBuf {
        &self.database_path
    }

    /// Entry point for the periodic driver; tick failures are logged and
    /// never stop the driver.
    pub fn on_tick(&self) {
        if let Err(error) = self.tick(Utc::now()) {
            self.log_error("tick", &error.to_string());
        }
    }

    fn tick(&self, now: DateTime<Utc>) -> Result<(), InfraError> {
        let _ops = self.lock_ops()?;
        let settings = self.repository.load_settings()?;
        let mut timer = self.repository.load_state(&settings, now)?;
        if !timer.running {
            return Ok(());
        }

        timer.last_tick = Some(now);
        let completions = reconcile(&mut timer, &settings, now);
        self.apply_completions(&completions, false, settings.history_limit)?;
        self.repository.save_state(&mut timer, now)?;
        self.notifier
            .state_changed(&snapshot_response(&timer, &settings, now));
        Ok(())
    }

    fn apply_completions(
        &self,
        completions: &[HistoryEntry],
        silent: bool,
        limit: usize,
    ) -> Result<(), InfraError> {
        if completions.is_empty() {
            return Ok(());
        }
        let history = self.repository.push_history(completions, limit)?;
        self.notifier.history_changed(&history);
        if !silent {
            for _ in completions {
                self.notifier.chime();
            }
        }
        Ok(())
    }

    fn lock_ops(&self) -> Result<MutexGuard<'_, ()>, InfraError> {
        self.op_guard
            .lock()
            .map_err(|error| InfraError::InvalidState(format!("operation lock poisoned: {error}")))
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerSnapshotResponse {
    pub mode: String,
    pub mode_label: String,
    pub remaining_seconds: i64,
    pub clock: String,
    pub running: bool,
    pub cycle: u32,
    pub toggle_label: String,
    pub progress_percent: f64,
    pub focus_minutes: u32,
    pub break_minutes: u32,
}

fn snapshot_response(
    timer: &TimerState,
    settings: &Settings,
    now: DateTime<Utc>,
) -> TimerSnapshotResponse {
    let remaining = if timer.running {
        timer.remaining_from(now)
    } else {
        timer.remaining.max(0)
    };
    let total = settings.duration_seconds(timer.mode);

    TimerSnapshotResponse {
        mode: timer.mode.as_str().to_string(),
        mode_label: timer.mode.label().to_string(),
        remaining_seconds: remaining,
        clock: format_clock(remaining),
        running: timer.running,
        cycle: timer.cycle,
        toggle_label: if timer.running { "Pause" } else { "Start" }.to_string(),
        progress_percent: progress_percent(total, remaining),
        focus_minutes: settings.focus_minutes,
        break_minutes: settings.break_minutes,
    }
}

pub fn get_snapshot_impl(state: &AppState) -> Result<TimerSnapshotResponse, InfraError> {
    snapshot_at(state, Utc::now())
}

pub fn get_settings_impl(state: &AppState) -> Result<Settings, InfraError> {
    let engine = state.engine();
    let _ops = engine.lock_ops()?;
    engine.repository.load_settings()
}

pub fn list_history_impl(state: &AppState) -> Result<Vec<HistoryEntry>, InfraError> {
    let engine = state.engine();
    let _ops = engine.lock_ops()?;
    engine.repository.load_history()
}

pub fn toggle_timer_impl(state: &AppState) -> Result<TimerSnapshotResponse, InfraError> {
    toggle_at(state, Utc::now())
}

pub fn reset_timer_impl(state: &AppState) -> Result<TimerSnapshotResponse, InfraError> {
    reset_at(state, Utc::now())
}

pub fn skip_block_impl(state: &AppState) -> Result<TimerSnapshotResponse, InfraError> {
    skip_at(state, Utc::now())
}

pub fn update_settings_impl(
    state: &AppState,
    focus_minutes: String,
    break_minutes: String,
) -> Result<Settings, InfraError> {
    update_settings_at(state, &focus_minutes, &break_minutes, Utc::now())
}

pub fn resume_timer_impl(state: &AppState) -> Result<TimerSnapshotResponse, InfraError> {
    resume_at(state, Utc::now())
}

pub fn clear_storage_impl(state: &AppState) -> Result<TimerSnapshotResponse, InfraError> {
    clear_at(state, Utc::now())
}

fn snapshot_at(state: &AppState, now: DateTime<Utc>) -> Result<TimerSnapshotResponse, InfraError> {
    let engine = state.engine();
    let _ops = engine.lock_ops()?;
    let settings = engine.repository.load_settings()?;
    let timer = engine.repository.load_state(&settings, now)?;
    Ok(snapshot_response(&timer, &settings, now))
}

fn toggle_at(state: &AppState, now: DateTime<Utc>) -> Result<TimerSnapshotResponse, InfraError> {
    let engine = state.engine();
    let _ops = engine.lock_ops()?;
    let settings = engine.repository.load_settings()?;
    let mut timer = engine.repository.load_state(&settings, now)?;

    timer.running = !timer.running;
    if timer.running {
        timer.end_at = Some(now + Duration::seconds(timer.remaining.max(0)));
        engine.ticker.start(Arc::clone(engine));
        engine.log_info("toggle_timer", &format!("started {} block", timer.mode.as_str()));
    } else {
        // A pause right at or after expiry still records the completions.
        let completions = reconcile(&mut timer, &settings, now);
        engine.apply_completions(&completions, false, settings.history_limit)?;
        timer.end_at = None;
        engine.ticker.stop();
        engine.log_info("toggle_timer", "paused timer");
    }

    engine.repository.save_state(&mut timer, now)?;
    let snapshot = snapshot_response(&timer, &settings, now);
    engine.notifier.state_changed(&snapshot);
    Ok(snapshot)
}

fn reset_at(state: &AppState, now: DateTime<Utc>) -> Result<TimerSnapshotResponse, InfraError> {
    let engine = state.engine();
    engine.ticker.stop();

    let _ops = engine.lock_ops()?;
    let settings = engine.repository.load_settings()?;
    let mut timer = engine.repository.load_state(&settings, now)?;
    timer.running = false;
    timer.mode = TimerMode::Focus;
    timer.remaining = settings.duration_seconds(TimerMode::Focus);
    timer.cycle = 1;
    timer.end_at = None;

    engine.repository.save_state(&mut timer, now)?;
    let snapshot = snapshot_response(&timer, &settings, now);
    engine.notifier.state_changed(&snapshot);
    engine.log_info("reset_timer", "reset to initial focus block");
    Ok(snapshot)
}

fn skip_at(state: &AppState, now: DateTime<Utc>) -> Result<TimerSnapshotResponse, InfraError> {
    let engine = state.engine();
    engine.ticker.stop();

    let _ops = engine.lock_ops()?;
    let settings = engine.repository.load_settings()?;
    let mut timer = engine.repository.load_state(&settings, now)?;
    timer.running = false;
    timer.end_at = None;

    // Exactly one forced completion, stamped with "now" since there is no
    // scheduled anchor to attribute it to.
    let entry = complete_block(&mut timer, &settings, now);
    let skipped = entry.mode;
    engine.apply_completions(std::slice::from_ref(&entry), false, settings.history_limit)?;

    engine.repository.save_state(&mut timer, now)?;
    let snapshot = snapshot_response(&timer, &settings, now);
    engine.notifier.state_changed(&snapshot);
    engine.log_info("skip_block", &format!("skipped {} block", skipped.as_str()));
    Ok(snapshot)
}

fn update_settings_at(
    state: &AppState,
    focus_minutes: &str,
    break_minutes: &str,
    now: DateTime<Utc>,
) -> Result<Settings, InfraError> {
    let engine = state.engine();
    let _ops = engine.lock_ops()?;
    let settings = Settings::clamped(
        clamp_minutes(focus_minutes, FOCUS_MINUTES_MIN, FOCUS_MINUTES_MAX),
        clamp_minutes(break_minutes, BREAK_MINUTES_MIN, BREAK_MINUTES_MAX),
    );
    engine.repository.save_settings(&settings)?;

    // A paused timer resizes immediately; a running countdown keeps its
    // anchor and only the next completed block uses the new durations.
    let mut timer = engine.repository.load_state(&settings, now)?;
    if !timer.running {
        timer.remaining = settings.duration_seconds(timer.mode);
        engine.repository.save_state(&mut timer, now)?;
        engine
            .notifier
            .state_changed(&snapshot_response(&timer, &settings, now));
    }

    engine.log_info(
        "update_settings",
        &format!(
            "focus={}m break={}m",
            settings.focus_minutes, settings.break_minutes
        ),
    );
    Ok(settings)
}

fn resume_at(state: &AppState, now: DateTime<Utc>) -> Result<TimerSnapshotResponse, InfraError> {
    let engine = state.engine();
    let _ops = engine.lock_ops()?;
    let settings = engine.repository.load_settings()?;
    let mut timer = engine.repository.load_state(&settings, now)?;

    if timer.running {
        // Blocks missed while the app was closed are replayed without
        // chiming for each of them.
        let completions = reconcile(&mut timer, &settings, now);
        let replayed = completions.len();
        engine.apply_completions(&completions, true, settings.history_limit)?;
        engine.repository.save_state(&mut timer, now)?;
        engine.ticker.start(Arc::clone(engine));
        if replayed > 0 {
            engine.log_info("resume_timer", &format!("replayed {replayed} missed blocks"));
        }
    }

    let snapshot = snapshot_response(&timer, &settings, now);
    engine.notifier.state_changed(&snapshot);
    engine
        .notifier
        .history_changed(&engine.repository.load_history()?);
    Ok(snapshot)
}

fn clear_at(state: &AppState, now: DateTime<Utc>) -> Result<TimerSnapshotResponse, InfraError> {
    let engine = state.engine();
    engine.ticker.stop();

    let _ops = engine.lock_ops()?;
    engine.repository.clear_all()?;
    let settings = engine.repository.load_settings()?;
    let timer = engine.repository.load_state(&settings, now)?;

    let snapshot = snapshot_response(&timer, &settings, now);
    engine.notifier.state_changed(&snapshot);
    engine.notifier.history_changed(&[]);
    engine.log_info("clear_storage", "erased settings, state, and history");
    Ok(snapshot)
}
