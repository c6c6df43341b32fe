use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Minimum spacing between two accepted writes for one user.
pub const RATE_LIMIT_WINDOW_MS: i64 = 2_000;
/// The document store's per-commit operation limit.
pub const RESET_BATCH_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub rate_limit_window_ms: i64,
    /// Offset of the canonical zone used for "today".
    pub utc_offset_minutes: i32,
    pub max_commit_attempts: u32,
    pub reset_batch_size: usize,
    pub admin_email_domain: String,
    pub reset_secret_sha256: Option<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            rate_limit_window_ms: RATE_LIMIT_WINDOW_MS,
            utc_offset_minutes: 330,
            max_commit_attempts: 5,
            reset_batch_size: RESET_BATCH_LIMIT,
            admin_email_domain: "ves.ac.in".to_string(),
            reset_secret_sha256: None,
        }
    }
}

impl Policy {
    pub fn zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::milliseconds(self.rate_limit_window_ms.max(0))
    }
}
