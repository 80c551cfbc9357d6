use crate::application::commands::TimerSnapshotResponse;
use crate::domain::models::HistoryEntry;
use tauri::{AppHandle, Emitter};

/// Collaborator surface for everything the core fires at the UI: the
/// completion chime and re-render notifications. Implementations must
/// never propagate failures back into the state machine.
pub trait TimerNotifier: Send + Sync {
    fn chime(&self);
    fn state_changed(&self, snapshot: &TimerSnapshotResponse);
    fn history_changed(&self, history: &[HistoryEntry]);
}

pub struct TauriNotifier {
    app: AppHandle,
}

impl TauriNotifier {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl TimerNotifier for TauriNotifier {
    // The webview may not be listening yet; emission failures are dropped.
    fn chime(&self) {
        let _ = self.app.emit("timer-chime", ());
    }

    fn state_changed(&self, snapshot: &TimerSnapshotResponse) {
        let _ = self.app.emit("timer-state", snapshot);
    }

    fn history_changed(&self, history: &[HistoryEntry]) {
        let _ = self.app.emit("timer-history", history);
    }
}
