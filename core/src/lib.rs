//! Core utilities and shared types for the jstrack engine.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// One raw script as handed over by the extraction layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSource {
    pub url: String,
    pub content: String,
    pub size: i64,
}

/// Current wall-clock time in milliseconds since the unix epoch.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn now_ms_is_recent() {
        // 2020-01-01 in ms; anything after that is sane for a clock
        assert!(now_ms() > 1_577_836_800_000);
    }
}
