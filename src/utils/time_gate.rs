// src/utils/time_gate.rs
// The "working hours gate" (GLOSSARY), used by ingress (§4.G step 2) and by
// the escalation monitor's silence branch (§4.E step 2).
//
// Grounded in the original `should_process_message_by_time`.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};

use crate::config::PingerConfig;

fn weekday_abbrev(w: Weekday) -> &'static str {
    match w {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn parse_message_time(message_time: &str) -> Option<NaiveDateTime> {
    // The source replaces a space separator with 'T' before an ISO-8601 parse.
    let normalized = message_time.replacen(' ', "T", 1);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// `enabled ∧ day ∈ days ∧ start_time ≤ t ≤ end_time` (UTC), per the
/// GLOSSARY. `message_time` is assumed UTC.
pub fn should_process_by_time(message_time: &str, chat: &PingerConfig) -> bool {
    if !chat.enabled {
        return false;
    }

    let Some(msg_dt) = parse_message_time(message_time) else {
        return false;
    };

    // An unset start/end window means no window restriction (§9: a chat
    // that only restricts `days`, or neither, is still admissible).
    match (&chat.start_time, &chat.end_time) {
        (Some(start), Some(end)) => {
            let (Ok(start), Ok(end)) = (
                NaiveTime::parse_from_str(start, "%H:%M"),
                NaiveTime::parse_from_str(end, "%H:%M"),
            ) else {
                return false;
            };
            let t = msg_dt.time();
            if !(start <= t && t <= end) {
                return false;
            }
        }
        (None, None) => {}
        _ => return false,
    }

    match &chat.days {
        Some(days) => days.contains(weekday_abbrev(msg_dt.weekday())),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn chat(start: &str, end: &str, days: Option<&[&str]>) -> PingerConfig {
        PingerConfig {
            whitelist: HashSet::new(),
            bot_enabled: true,
            message_timeout: 30,
            redis_buffer_window: 2,
            output_chat_id: None,
            enabled: true,
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
            days: days.map(|d| d.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn blocked_outside_working_days() {
        // 2025-01-18 is a Saturday.
        let chat = chat("09:00", "17:00", Some(&["mon", "tue", "wed", "thu", "fri"]));
        assert!(!should_process_by_time("2025-01-18 10:00:00", &chat));
    }

    #[test]
    fn allowed_inside_window_and_days() {
        let chat = chat("09:00", "17:00", Some(&["mon", "tue", "wed", "thu", "fri"]));
        assert!(should_process_by_time("2025-01-20 10:00:00", &chat)); // Monday
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let chat = chat("09:00", "17:00", None);
        assert!(should_process_by_time("2025-01-20 09:00:00", &chat));
        assert!(should_process_by_time("2025-01-20 17:00:00", &chat));
        assert!(!should_process_by_time("2025-01-20 17:00:01", &chat));
    }

    #[test]
    fn no_window_configured_is_unrestricted() {
        let mut chat = chat("09:00", "17:00", None);
        chat.start_time = None;
        chat.end_time = None;
        assert!(should_process_by_time("2025-01-20 23:00:00", &chat));
    }

    #[test]
    fn disabled_chat_always_blocked() {
        let mut chat = chat("09:00", "17:00", None);
        chat.enabled = false;
        assert!(!should_process_by_time("2025-01-20 10:00:00", &chat));
    }

    #[test]
    fn missing_time_window_blocks() {
        let mut chat = chat("09:00", "17:00", None);
        chat.start_time = None;
        assert!(!should_process_by_time("2025-01-20 10:00:00", &chat));
    }
}
