use super::{CheckinClaim, LocationSample};
use crate::domain::value_objects::{CheckinEventId, CheckinSyncStatus, SiteId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 同期状態のメタデータ。作成後に変化するのはこの部分だけ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub status: CheckinSyncStatus,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl SyncMetadata {
    pub fn pending() -> Self {
        Self {
            status: CheckinSyncStatus::Pending,
            retry_count: 0,
            last_attempt_at: None,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinEvent {
    pub id: CheckinEventId,
    pub site_id: SiteId,
    pub worker_id: WorkerId,
    pub location: LocationSample,
    pub claim: CheckinClaim,
    pub created_at: DateTime<Utc>,
    pub sync: SyncMetadata,
}

impl CheckinEvent {
    /// 新規イベントは常に PENDING で生成する
    pub fn new_pending(
        id: CheckinEventId,
        worker_id: WorkerId,
        location: LocationSample,
        claim: CheckinClaim,
        created_at: DateTime<Utc>,
    ) -> Self {
        let created_at = DateTime::from_timestamp_millis(created_at.timestamp_millis())
            .unwrap_or(created_at);
        Self {
            id,
            site_id: claim.site_id.clone(),
            worker_id,
            location,
            claim,
            created_at,
            sync: SyncMetadata::pending(),
        }
    }

    pub fn status(&self) -> CheckinSyncStatus {
        self.sync.status
    }

    /// 業務フィールドが一致するか（同期メタデータは比較しない）
    pub fn same_business_fields(&self, other: &CheckinEvent) -> bool {
        self.id == other.id
            && self.site_id == other.site_id
            && self.worker_id == other.worker_id
            && self.location == other.location
            && self.claim == other.claim
            && self.created_at == other.created_at
    }
}
