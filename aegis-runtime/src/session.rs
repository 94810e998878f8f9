//! Trading-session gating for the supervisor (C20), per SPEC_FULL §6: "the parent respects
//! configured trading sessions: outside sessions, child is stopped; inside, child is (re)started."

use aegis_core::config::SessionWindow;
use chrono::{NaiveTime, Timelike};

/// Whether `now` (wall-clock time, caller's choice of timezone — the exchange's local time in
/// production) falls inside any of `sessions`. An empty `sessions` list means "always in
/// session" (the minimal config in `aegis_core::config`'s own tests has no session windows and
/// still parses), matching "missing keys fall back to defaults" read as "no gating configured".
pub fn is_in_session(now: NaiveTime, sessions: &[SessionWindow]) -> bool {
    if sessions.is_empty() {
        return true;
    }
    sessions.iter().any(|w| window_contains(w, now))
}

fn window_contains(window: &SessionWindow, now: NaiveTime) -> bool {
    let Some(start) = NaiveTime::from_hms_opt(window.start_hour, window.start_minute, 0) else {
        return false;
    };
    let Some(end) = NaiveTime::from_hms_opt(window.end_hour, window.end_minute, 0) else {
        return false;
    };
    if start <= end {
        now >= start && now < end
    } else {
        // Overnight session (e.g. night session 21:00-02:30): wraps past midnight.
        now >= start || now < end
    }
}

/// Convenience wrapper over [`is_in_session`] taking the current instant directly, so callers
/// don't need to import `chrono::Timelike` just to shave off the date component.
pub fn is_now_in_session(now: chrono::DateTime<chrono::Utc>, sessions: &[SessionWindow]) -> bool {
    is_in_session(NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second()).unwrap_or_default(), sessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(sh: u32, sm: u32, eh: u32, em: u32) -> SessionWindow {
        SessionWindow { start_hour: sh, start_minute: sm, end_hour: eh, end_minute: em }
    }

    #[test]
    fn empty_sessions_means_always_open() {
        assert!(is_in_session(NaiveTime::from_hms_opt(3, 0, 0).unwrap(), &[]));
    }

    #[test]
    fn daytime_session_contains_its_interior() {
        let sessions = vec![window(9, 0, 15, 0)];
        assert!(is_in_session(NaiveTime::from_hms_opt(10, 30, 0).unwrap(), &sessions));
        assert!(!is_in_session(NaiveTime::from_hms_opt(16, 0, 0).unwrap(), &sessions));
    }

    #[test]
    fn session_end_is_exclusive() {
        let sessions = vec![window(9, 0, 15, 0)];
        assert!(!is_in_session(NaiveTime::from_hms_opt(15, 0, 0).unwrap(), &sessions));
    }

    #[test]
    fn overnight_session_wraps_past_midnight() {
        let sessions = vec![window(21, 0, 2, 30)];
        assert!(is_in_session(NaiveTime::from_hms_opt(23, 0, 0).unwrap(), &sessions));
        assert!(is_in_session(NaiveTime::from_hms_opt(1, 0, 0).unwrap(), &sessions));
        assert!(!is_in_session(NaiveTime::from_hms_opt(10, 0, 0).unwrap(), &sessions));
    }

    #[test]
    fn multiple_windows_are_unioned() {
        let sessions = vec![window(9, 0, 11, 30), window(13, 30, 15, 0)];
        assert!(is_in_session(NaiveTime::from_hms_opt(14, 0, 0).unwrap(), &sessions));
        assert!(!is_in_session(NaiveTime::from_hms_opt(12, 0, 0).unwrap(), &sessions));
    }
}
