use crate::application::commands::TimerEngine;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tauri::async_runtime::{self, JoinHandle};

/// The periodic driver: re-enters the reconciliation path once per second
/// while the timer runs. Rendering is decoupled from it; each tick
/// persists and notifies on its own.
pub struct Ticker {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Starting an already-running driver is a no-op.
    pub fn start(&self, engine: Arc<TimerEngine>) {
        let Ok(mut guard) = self.handle.lock() else {
            return;
        };
        if guard.is_some() {
            return;
        }
        *guard = Some(async_runtime::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                engine.on_tick();
            }
        }));
    }

    /// Stopping an already-stopped driver is a no-op.
    pub fn stop(&self) {
        let Ok(mut guard) = self.handle.lock() else {
            return;
        };
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}
