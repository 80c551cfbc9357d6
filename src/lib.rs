mod application;
mod domain;
mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    clear_storage_impl, get_settings_impl, get_snapshot_impl, list_history_impl, reset_timer_impl,
    resume_timer_impl, skip_block_impl, toggle_timer_impl, update_settings_impl, AppState,
    TimerSnapshotResponse,
};
use application::notifier::TauriNotifier;
use domain::models::{HistoryEntry, Settings};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tauri::Manager;

#[derive(Debug, Serialize)]
struct BootstrapResponse {
    workspace_root: String,
    database_path: String,
}

#[tauri::command]
fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

#[tauri::command]
fn ping() -> &'static str {
    "pong"
}

#[tauri::command]
fn get_timer_snapshot(state: tauri::State<'_, AppState>) -> Result<TimerSnapshotResponse, String> {
    get_snapshot_impl(state.inner())
        .map_err(|error| state.command_error("get_timer_snapshot", &error))
}

#[tauri::command]
fn toggle_timer(state: tauri::State<'_, AppState>) -> Result<TimerSnapshotResponse, String> {
    toggle_timer_impl(state.inner()).map_err(|error| state.command_error("toggle_timer", &error))
}

#[tauri::command]
fn reset_timer(state: tauri::State<'_, AppState>) -> Result<TimerSnapshotResponse, String> {
    reset_timer_impl(state.inner()).map_err(|error| state.command_error("reset_timer", &error))
}

#[tauri::command]
fn skip_block(state: tauri::State<'_, AppState>) -> Result<TimerSnapshotResponse, String> {
    skip_block_impl(state.inner()).map_err(|error| state.command_error("skip_block", &error))
}

#[tauri::command]
fn update_settings(
    state: tauri::State<'_, AppState>,
    focus_minutes: String,
    break_minutes: String,
) -> Result<Settings, String> {
    update_settings_impl(state.inner(), focus_minutes, break_minutes)
        .map_err(|error| state.command_error("update_settings", &error))
}

#[tauri::command]
fn get_settings(state: tauri::State<'_, AppState>) -> Result<Settings, String> {
    get_settings_impl(state.inner()).map_err(|error| state.command_error("get_settings", &error))
}

#[tauri::command]
fn list_history(state: tauri::State<'_, AppState>) -> Result<Vec<HistoryEntry>, String> {
    list_history_impl(state.inner()).map_err(|error| state.command_error("list_history", &error))
}

#[tauri::command]
fn resume_timer(state: tauri::State<'_, AppState>) -> Result<TimerSnapshotResponse, String> {
    resume_timer_impl(state.inner()).map_err(|error| state.command_error("resume_timer", &error))
}

#[tauri::command]
fn clear_storage(state: tauri::State<'_, AppState>) -> Result<TimerSnapshotResponse, String> {
    clear_storage_impl(state.inner()).map_err(|error| state.command_error("clear_storage", &error))
}

pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            let workspace_root = std::env::current_dir()?;
            let notifier = Arc::new(TauriNotifier::new(app.handle().clone()));
            let state = AppState::new(workspace_root, notifier)?;

            // Pick up a countdown that was running when the app last quit;
            // blocks missed in between are replayed without chiming.
            if let Err(error) = resume_timer_impl(&state) {
                state.command_error("resume_timer", &error);
            }

            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            ping,
            bootstrap,
            get_timer_snapshot,
            toggle_timer,
            reset_timer,
            skip_block,
            update_settings,
            get_settings,
            list_history,
            resume_timer,
            clear_storage
        ])
        .run(tauri::generate_context!())
        .expect("failed to run tauri app");
}
