use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FOCUS_MINUTES_MIN: u32 = 1;
pub const FOCUS_MINUTES_MAX: u32 = 180;
pub const BREAK_MINUTES_MIN: u32 = 1;
pub const BREAK_MINUTES_MAX: u32 = 60;
pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_HISTORY_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    Focus,
    Break,
}

impl TimerMode {
    pub fn flipped(self) -> Self {
        match self {
            Self::Focus => Self::Break,
            Self::Break => Self::Focus,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::Break => "Break",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub focus_minutes: u32,
    pub break_minutes: u32,
    pub history_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            break_minutes: DEFAULT_BREAK_MINUTES,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Settings {
    pub fn clamped(focus_minutes: u32, break_minutes: u32) -> Self {
        Self {
            focus_minutes: focus_minutes.clamp(FOCUS_MINUTES_MIN, FOCUS_MINUTES_MAX),
            break_minutes: break_minutes.clamp(BREAK_MINUTES_MIN, BREAK_MINUTES_MAX),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn duration_minutes(&self, mode: TimerMode) -> u32 {
        let minutes = match mode {
            TimerMode::Focus => self.focus_minutes,
            TimerMode::Break => self.break_minutes,
        };
        // Durations below one minute would stall the reconciliation loop.
        minutes.max(1)
    }

    pub fn duration_seconds(&self, mode: TimerMode) -> i64 {
        i64::from(self.duration_minutes(mode)) * 60
    }
}

/// Parses raw form input into minutes, clamping to the given bounds.
/// Non-numeric input lands on the minimum bound.
pub fn clamp_minutes(raw: &str, min: u32, max: u32) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(value) if value <= i64::from(min) => min,
        Ok(value) if value >= i64::from(max) => max,
        Ok(value) => value as u32,
        Err(_) => min,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub mode: TimerMode,
    pub remaining: i64,
    pub running: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_tick: Option<DateTime<Utc>>,
    pub cycle: u32,
}

impl TimerState {
    pub fn initial(settings: &Settings) -> Self {
        Self {
            mode: TimerMode::Focus,
            remaining: settings.duration_seconds(TimerMode::Focus),
            running: false,
            end_at: None,
            saved_at: None,
            last_tick: None,
            cycle: 1,
        }
    }

    /// Seconds left until `end_at`, rounded up, never negative.
    pub fn remaining_from(&self, now: DateTime<Utc>) -> i64 {
        let Some(end_at) = self.end_at else {
            return self.remaining.max(0);
        };
        let delta_ms = end_at.timestamp_millis() - now.timestamp_millis();
        if delta_ms <= 0 {
            0
        } else {
            (delta_ms + 999) / 1000
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub mode: TimerMode,
    pub duration_minutes: u32,
    pub completed_at: DateTime<Utc>,
}

pub fn format_clock(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub fn progress_percent(total_seconds: i64, remaining_seconds: i64) -> f64 {
    if total_seconds <= 0 {
        return 0.0;
    }
    let elapsed = (total_seconds - remaining_seconds) as f64;
    (elapsed / total_seconds as f64 * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn settings_clamp_from_raw_input() {
        assert_eq!(clamp_minutes("0", FOCUS_MINUTES_MIN, FOCUS_MINUTES_MAX), 1);
        assert_eq!(
            clamp_minutes("9999", FOCUS_MINUTES_MIN, FOCUS_MINUTES_MAX),
            180
        );
        assert_eq!(
            clamp_minutes("abc", FOCUS_MINUTES_MIN, FOCUS_MINUTES_MAX),
            1
        );
        assert_eq!(clamp_minutes(" 42 ", FOCUS_MINUTES_MIN, FOCUS_MINUTES_MAX), 42);
        assert_eq!(clamp_minutes("-7", BREAK_MINUTES_MIN, BREAK_MINUTES_MAX), 1);
        assert_eq!(clamp_minutes("90", BREAK_MINUTES_MIN, BREAK_MINUTES_MAX), 60);
    }

    #[test]
    fn settings_clamped_constructor_enforces_bounds() {
        let settings = Settings::clamped(0, 500);
        assert_eq!(settings.focus_minutes, FOCUS_MINUTES_MIN);
        assert_eq!(settings.break_minutes, BREAK_MINUTES_MAX);
        assert_eq!(settings.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn initial_state_uses_focus_duration() {
        let settings = Settings::default();
        let state = TimerState::initial(&settings);
        assert_eq!(state.mode, TimerMode::Focus);
        assert_eq!(state.remaining, 25 * 60);
        assert!(!state.running);
        assert_eq!(state.cycle, 1);
        assert!(state.end_at.is_none());
    }

    #[test]
    fn remaining_from_rounds_up_and_clamps() {
        let now = fixed_time("2026-03-01T12:00:00Z");
        let mut state = TimerState::initial(&Settings::default());
        state.end_at = Some(now + chrono::Duration::milliseconds(1500));
        assert_eq!(state.remaining_from(now), 2);
        state.end_at = Some(now - chrono::Duration::seconds(5));
        assert_eq!(state.remaining_from(now), 0);
        state.end_at = None;
        state.remaining = 90;
        assert_eq!(state.remaining_from(now), 90);
    }

    #[test]
    fn format_clock_pads_and_clamps() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(25 * 60), "25:00");
        assert_eq!(format_clock(-12), "00:00");
    }

    #[test]
    fn progress_percent_is_clamped() {
        assert_eq!(progress_percent(100, 100), 0.0);
        assert_eq!(progress_percent(100, 0), 100.0);
        assert_eq!(progress_percent(100, 50), 50.0);
        assert_eq!(progress_percent(100, 150), 0.0);
        assert_eq!(progress_percent(0, 10), 0.0);
    }

    #[test]
    fn timer_state_serializes_timestamps_as_millis() {
        let now = fixed_time("2026-03-01T12:00:00Z");
        let mut state = TimerState::initial(&Settings::default());
        state.running = true;
        state.end_at = Some(now);

        let value = serde_json::to_value(&state).expect("serialize state");
        assert_eq!(value["endAt"], serde_json::json!(now.timestamp_millis()));
        assert_eq!(value["savedAt"], serde_json::Value::Null);
        assert_eq!(value["mode"], serde_json::json!("focus"));

        let roundtrip: TimerState = serde_json::from_value(value).expect("deserialize state");
        assert_eq!(roundtrip, state);
    }

    #[test]
    fn history_entry_serializes_completed_at_as_rfc3339() {
        let entry = HistoryEntry {
            mode: TimerMode::Break,
            duration_minutes: 5,
            completed_at: fixed_time("2026-03-01T12:34:56Z"),
        };
        let value = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(value["mode"], serde_json::json!("break"));
        assert_eq!(value["durationMinutes"], serde_json::json!(5));
        assert_eq!(
            value["completedAt"],
            serde_json::json!("2026-03-01T12:34:56Z")
        );
    }

    proptest! {
        #[test]
        fn clamp_minutes_always_lands_within_bounds(raw in "\\PC*") {
            let clamped = clamp_minutes(&raw, FOCUS_MINUTES_MIN, FOCUS_MINUTES_MAX);
            prop_assert!((FOCUS_MINUTES_MIN..=FOCUS_MINUTES_MAX).contains(&clamped));
        }

        #[test]
        fn duration_seconds_is_always_positive(focus in 0u32..1000, breaks in 0u32..1000) {
            let settings = Settings::clamped(focus, breaks);
            prop_assert!(settings.duration_seconds(TimerMode::Focus) >= 60);
            prop_assert!(settings.duration_seconds(TimerMode::Break) >= 60);
        }
    }
}
