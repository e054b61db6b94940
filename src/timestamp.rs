//! Compact timestamps used to stamp runs and output lines.

use chrono::{Local, Utc};

const COMPACT_FORMAT: &str = "%Y%m%d%H%M%S";

/// Local time as `YYYYMMDDhhmmss`.
pub fn now() -> String {
    Local::now().format(COMPACT_FORMAT).to_string()
}

/// UTC time as `YYYYMMDDhhmmss`.
pub fn now_utc() -> String {
    Utc::now().format(COMPACT_FORMAT).to_string()
}
