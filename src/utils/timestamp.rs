// src/utils/timestamp.rs

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix seconds, fractional.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
