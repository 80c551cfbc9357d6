use crate::domain::models::{HistoryEntry, Settings, TimerMode, TimerState};
use chrono::{DateTime, Duration, Utc};

/// Brings a timer state up to date with `now`, replaying every block
/// completion that fell inside the gap since the state was last observed.
///
/// Each replayed completion is timestamped with its scheduled instant,
/// not `now`, so back-to-back completions inside a long gap keep distinct
/// chronological timestamps. Completed entries are returned oldest first;
/// the caller owns appending them to history and playing the chime.
///
/// A no-op when no anchor is set (paused or already consistent). The loop
/// terminates for any finite gap because durations are clamped to at
/// least one minute at the settings boundary.
pub fn reconcile(
    state: &mut TimerState,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Vec<HistoryEntry> {
    let Some(mut end_at) = state.end_at else {
        return Vec::new();
    };

    let mut completions = Vec::new();
    while end_at <= now {
        completions.push(complete_block(state, settings, end_at));
        end_at = end_at + Duration::seconds(settings.duration_seconds(state.mode));
    }

    state.end_at = Some(end_at);
    state.remaining = state.remaining_from(now);
    completions
}

/// Completes the current block at `completed_at`: records a history
/// entry, flips the mode (incrementing `cycle` on break→focus), and
/// resets `remaining` to the new mode's full duration.
pub fn complete_block(
    state: &mut TimerState,
    settings: &Settings,
    completed_at: DateTime<Utc>,
) -> HistoryEntry {
    let entry = HistoryEntry {
        mode: state.mode,
        duration_minutes: settings.duration_minutes(state.mode),
        completed_at,
    };

    state.mode = state.mode.flipped();
    if state.mode == TimerMode::Focus {
        state.cycle += 1;
    }
    state.remaining = settings.duration_seconds(state.mode);
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TimerMode;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn minute_settings() -> Settings {
        Settings::clamped(1, 1)
    }

    fn running_state(settings: &Settings, end_at: DateTime<Utc>) -> TimerState {
        let mut state = TimerState::initial(settings);
        state.running = true;
        state.end_at = Some(end_at);
        state
    }

    #[test]
    fn no_anchor_is_a_no_op() {
        let settings = Settings::default();
        let mut state = TimerState::initial(&settings);
        let before = state.clone();
        let completions = reconcile(&mut state, &settings, fixed_time("2026-03-01T12:00:00Z"));
        assert!(completions.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn future_anchor_only_refreshes_remaining() {
        let settings = Settings::default();
        let now = fixed_time("2026-03-01T12:00:00Z");
        let mut state = running_state(&settings, now + Duration::seconds(90));
        state.remaining = 1;

        let completions = reconcile(&mut state, &settings, now);
        assert!(completions.is_empty());
        assert_eq!(state.remaining, 90);
        assert_eq!(state.mode, TimerMode::Focus);
        assert_eq!(state.cycle, 1);
    }

    #[test]
    fn single_expiry_flips_to_break_without_cycle_bump() {
        let settings = minute_settings();
        let now = fixed_time("2026-03-01T12:00:00Z");
        let expired_at = now - Duration::seconds(10);
        let mut state = running_state(&settings, expired_at);

        let completions = reconcile(&mut state, &settings, now);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].mode, TimerMode::Focus);
        assert_eq!(completions[0].duration_minutes, 1);
        assert_eq!(completions[0].completed_at, expired_at);
        assert_eq!(state.mode, TimerMode::Break);
        assert_eq!(state.cycle, 1);
        assert_eq!(state.end_at, Some(expired_at + Duration::seconds(60)));
        assert_eq!(state.remaining, 50);
    }

    #[test]
    fn catch_up_replays_focus_then_break_into_third_block() {
        // Anchor expired 90s ago with 1-minute blocks: the focus block
        // completes at the anchor, the break completes 60s later, and the
        // next focus block is 30s in with 30s remaining.
        let settings = minute_settings();
        let now = fixed_time("2026-03-01T12:00:00Z");
        let anchor = now - Duration::seconds(90);
        let mut state = running_state(&settings, anchor);

        let completions = reconcile(&mut state, &settings, now);
        assert_eq!(completions.len(), 2);
        assert_eq!(completions[0].mode, TimerMode::Focus);
        assert_eq!(completions[0].completed_at, anchor);
        assert_eq!(completions[1].mode, TimerMode::Break);
        assert_eq!(completions[1].completed_at, anchor + Duration::seconds(60));
        assert_eq!(state.mode, TimerMode::Focus);
        assert_eq!(state.cycle, 2);
        assert_eq!(state.remaining, 30);
        assert_eq!(state.end_at, Some(now + Duration::seconds(30)));
    }

    #[test]
    fn long_gap_records_every_missed_block_individually() {
        let settings = minute_settings();
        let now = fixed_time("2026-03-01T12:00:00Z");
        let anchor = now - Duration::seconds(150);
        let mut state = running_state(&settings, anchor);

        let completions = reconcile(&mut state, &settings, now);
        let modes: Vec<TimerMode> = completions.iter().map(|entry| entry.mode).collect();
        assert_eq!(
            modes,
            vec![TimerMode::Focus, TimerMode::Break, TimerMode::Focus]
        );
        let stamps: Vec<DateTime<Utc>> =
            completions.iter().map(|entry| entry.completed_at).collect();
        assert_eq!(
            stamps,
            vec![
                anchor,
                anchor + Duration::seconds(60),
                anchor + Duration::seconds(120)
            ]
        );
        assert_eq!(state.mode, TimerMode::Break);
        assert_eq!(state.cycle, 2);
        assert_eq!(state.remaining, 30);
    }

    #[test]
    fn reconcile_is_idempotent_for_the_same_instant() {
        let settings = minute_settings();
        let now = fixed_time("2026-03-01T12:00:00Z");
        let mut state = running_state(&settings, now - Duration::seconds(90));

        let first = reconcile(&mut state, &settings, now);
        assert!(!first.is_empty());
        let snapshot = state.clone();

        let second = reconcile(&mut state, &settings, now);
        assert!(second.is_empty());
        assert_eq!(state, snapshot);
    }

    #[test]
    fn pending_completions_use_the_settings_in_effect_now() {
        // The focus block was scheduled under old settings; the break that
        // follows it is sized by the settings passed at reconcile time.
        let settings = Settings::clamped(1, 3);
        let now = fixed_time("2026-03-01T12:00:00Z");
        let anchor = now - Duration::seconds(30);
        let mut state = running_state(&settings, anchor);

        let completions = reconcile(&mut state, &settings, now);
        assert_eq!(completions.len(), 1);
        assert_eq!(state.mode, TimerMode::Break);
        assert_eq!(state.end_at, Some(anchor + Duration::seconds(180)));
        assert_eq!(state.remaining, 150);
    }

    #[test]
    fn forced_completion_from_break_increments_cycle() {
        let settings = Settings::default();
        let now = fixed_time("2026-03-01T12:00:00Z");
        let mut state = TimerState::initial(&settings);
        state.mode = TimerMode::Break;

        let entry = complete_block(&mut state, &settings, now);
        assert_eq!(entry.mode, TimerMode::Break);
        assert_eq!(entry.duration_minutes, settings.break_minutes);
        assert_eq!(state.mode, TimerMode::Focus);
        assert_eq!(state.cycle, 2);
        assert_eq!(state.remaining, settings.duration_seconds(TimerMode::Focus));
    }

    proptest! {
        #[test]
        fn reconcile_always_leaves_the_anchor_in_the_future(
            gap_seconds in 0i64..200_000,
            focus in 1u32..180,
            breaks in 1u32..60
        ) {
            let settings = Settings::clamped(focus, breaks);
            let now = fixed_time("2026-03-01T12:00:00Z");
            let mut state = running_state(&settings, now - Duration::seconds(gap_seconds));

            let completions = reconcile(&mut state, &settings, now);
            let end_at = state.end_at.expect("anchor survives reconciliation");
            prop_assert!(end_at > now);
            prop_assert_eq!(state.remaining, state.remaining_from(now));
            prop_assert!(state.remaining >= 0);

            // Replaying again at the same instant changes nothing.
            let again = reconcile(&mut state, &settings, now);
            prop_assert!(again.is_empty());
            let _ = completions;
        }

        #[test]
        fn replayed_modes_strictly_alternate(gap_seconds in 0i64..50_000) {
            let settings = Settings::clamped(1, 1);
            let now = fixed_time("2026-03-01T12:00:00Z");
            let mut state = running_state(&settings, now - Duration::seconds(gap_seconds));
            let start_cycle = state.cycle;

            let completions = reconcile(&mut state, &settings, now);
            for pair in completions.windows(2) {
                prop_assert_eq!(pair[1].mode, pair[0].mode.flipped());
                prop_assert!(pair[1].completed_at > pair[0].completed_at);
            }
            let break_completions = completions
                .iter()
                .filter(|entry| entry.mode == TimerMode::Break)
                .count() as u32;
            prop_assert_eq!(state.cycle, start_cycle + break_completions);
        }
    }
}
