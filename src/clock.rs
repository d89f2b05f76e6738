//! Epoch-millisecond clock readings.
//!
//! The gateway wire format, the JSON store, and realtime envelopes all carry
//! unsigned millisecond timestamps. Everything that needs "now" goes through
//! [`now_millis`] so the convention lives in one place.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock reading in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
