use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 画面の「未同期あり」表示などに使う同期状態のスナップショット。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusSnapshot {
    pub is_syncing: bool,
    pub pending_events: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncStatusSnapshot {
    pub fn has_pending(&self) -> bool {
        self.pending_events > 0
    }
}
