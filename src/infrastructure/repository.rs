use crate::domain::models::{HistoryEntry, Settings, TimerMode, TimerState};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::{
    KeyValueStore, HISTORY_KEY, SETTINGS_KEY, STATE_KEY,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Persistence facade over the key-value store. Reads are tolerant:
/// missing, partial, or corrupt records fall back to defaults or derived
/// values and never surface an error to the caller. Store I/O failures
/// still propagate.
#[derive(Clone)]
pub struct TimerRepository {
    store: Arc<dyn KeyValueStore>,
}

impl TimerRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load_settings(&self) -> Result<Settings, InfraError> {
        let Some(raw) = self.store.read(SETTINGS_KEY)? else {
            return Ok(Settings::default());
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
            return Ok(Settings::default());
        };

        let defaults = Settings::default();
        let focus_minutes = finite_u32(&parsed, "focusMinutes").unwrap_or(defaults.focus_minutes);
        let break_minutes = finite_u32(&parsed, "breakMinutes").unwrap_or(defaults.break_minutes);
        Ok(Settings::clamped(focus_minutes, break_minutes))
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), InfraError> {
        self.store
            .write(SETTINGS_KEY, &serde_json::to_string(settings)?)
    }

    /// Reconstructs a valid timer state from whatever is stored. A missing
    /// `endAt` on a running state is rebuilt from `lastTick`, then
    /// `savedAt`, then `now`, in that preference order.
    pub fn load_state(
        &self,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<TimerState, InfraError> {
        let Some(raw) = self.store.read(STATE_KEY)? else {
            return Ok(TimerState::initial(settings));
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
            return Ok(TimerState::initial(settings));
        };

        let mode = match parsed.get("mode").and_then(Value::as_str) {
            Some("break") => TimerMode::Break,
            _ => TimerMode::Focus,
        };
        let remaining = finite_i64(&parsed, "remaining")
            .unwrap_or_else(|| settings.duration_seconds(TimerMode::Focus));
        let running = parsed
            .get("running")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let cycle = finite_u32(&parsed, "cycle").filter(|value| *value > 0).unwrap_or(1);
        let saved_at = timestamp_millis(&parsed, "savedAt");
        let last_tick = timestamp_millis(&parsed, "lastTick");

        let mut end_at = timestamp_millis(&parsed, "endAt");
        if end_at.is_none() && running {
            let anchor = last_tick.or(saved_at).unwrap_or(now);
            end_at = Some(anchor + Duration::seconds(remaining));
        }

        Ok(TimerState {
            mode,
            remaining,
            running,
            end_at,
            saved_at,
            last_tick,
            cycle,
        })
    }

    /// Persists the state, stamping `savedAt` with `now` and `lastTick`
    /// with `now` only while running.
    pub fn save_state(&self, state: &mut TimerState, now: DateTime<Utc>) -> Result<(), InfraError> {
        state.saved_at = Some(now);
        state.last_tick = state.running.then_some(now);
        self.store.write(STATE_KEY, &serde_json::to_string(state)?)
    }

    pub fn load_history(&self) -> Result<Vec<HistoryEntry>, InfraError> {
        let Some(raw) = self.store.read(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
            return Ok(Vec::new());
        };
        let Some(items) = parsed.as_array() else {
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect())
    }

    /// Prepends completions (given oldest first) so the stored log stays
    /// most-recent-first, truncated to `limit`. Returns the updated log.
    pub fn push_history(
        &self,
        completions: &[HistoryEntry],
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, InfraError> {
        let mut history: Vec<HistoryEntry> = completions.iter().rev().cloned().collect();
        history.extend(self.load_history()?);
        history.truncate(limit);
        self.store
            .write(HISTORY_KEY, &serde_json::to_string(&history)?)?;
        Ok(history)
    }

    pub fn clear_all(&self) -> Result<(), InfraError> {
        self.store.remove(SETTINGS_KEY)?;
        self.store.remove(STATE_KEY)?;
        self.store.remove(HISTORY_KEY)?;
        Ok(())
    }
}

fn finite_i64(parsed: &Value, key: &str) -> Option<i64> {
    parsed
        .get(key)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .map(|value| value as i64)
}

fn finite_u32(parsed: &Value, key: &str) -> Option<u32> {
    finite_i64(parsed, key).and_then(|value| u32::try_from(value).ok())
}

fn timestamp_millis(parsed: &Value, key: &str) -> Option<DateTime<Utc>> {
    finite_i64(parsed, key).and_then(DateTime::from_timestamp_millis)
}
