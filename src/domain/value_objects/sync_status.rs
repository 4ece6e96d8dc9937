use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckinSyncStatus {
    Pending,
    InFlight,
    Acked,
    RejectedRemote,
    FailedPermanent,
}

impl CheckinSyncStatus {
    pub const ALL: [CheckinSyncStatus; 5] = [
        CheckinSyncStatus::Pending,
        CheckinSyncStatus::InFlight,
        CheckinSyncStatus::Acked,
        CheckinSyncStatus::RejectedRemote,
        CheckinSyncStatus::FailedPermanent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinSyncStatus::Pending => "pending",
            CheckinSyncStatus::InFlight => "in_flight",
            CheckinSyncStatus::Acked => "acked",
            CheckinSyncStatus::RejectedRemote => "rejected_remote",
            CheckinSyncStatus::FailedPermanent => "failed_permanent",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckinSyncStatus::Acked
                | CheckinSyncStatus::RejectedRemote
                | CheckinSyncStatus::FailedPermanent
        )
    }

    /// 手動対応が必要な失敗状態
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            CheckinSyncStatus::RejectedRemote | CheckinSyncStatus::FailedPermanent
        )
    }
}

impl fmt::Display for CheckinSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CheckinSyncStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(CheckinSyncStatus::Pending),
            "in_flight" => Ok(CheckinSyncStatus::InFlight),
            "acked" => Ok(CheckinSyncStatus::Acked),
            "rejected_remote" => Ok(CheckinSyncStatus::RejectedRemote),
            "failed_permanent" => Ok(CheckinSyncStatus::FailedPermanent),
            other => Err(format!("Unknown checkin sync status: {other}")),
        }
    }
}
