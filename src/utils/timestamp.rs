// src/utils/timestamp.rs
// Centralized timestamp helpers so every subsystem stamps rows the same way

use chrono::Utc;

/// Current unix timestamp in seconds.
pub fn get_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Current unix timestamp in milliseconds.
pub fn get_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}
