use crate::domain::entities::CheckinEvent;
use crate::domain::value_objects::{CheckinEventId, CheckinSyncStatus, DeviceId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// ストアの変更通知。書き込み経路とは切り離して配信される。
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Appended(CheckinEventId),
    StatusChanged {
        ids: Vec<CheckinEventId>,
        status: CheckinSyncStatus,
    },
    Requeued(u64),
    Pruned(u64),
}

/// 同期メタデータの更新（業務フィールドは対象外）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: CheckinEventId,
    pub status: CheckinSyncStatus,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppendResult {
    pub event: CheckinEvent,
    /// false の場合は同じローカル ID が既に存在した
    pub inserted: bool,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// 永続化が完了してから返る。重複 ID は既存イベントを返す no-op。
    async fn append(&self, event: CheckinEvent) -> Result<AppendResult, AppError>;
    async fn get(&self, id: &CheckinEventId) -> Result<Option<CheckinEvent>, AppError>;
    async fn update_status(&self, update: StatusUpdate) -> Result<(), AppError>;
    /// まとめて適用する。途中状態は読み手に見えない。
    async fn update_statuses(&self, updates: Vec<StatusUpdate>) -> Result<(), AppError>;
    /// 作成順（古い順）に最大 limit 件
    async fn list_by_status(
        &self,
        status: CheckinSyncStatus,
        limit: u32,
    ) -> Result<Vec<CheckinEvent>, AppError>;
    async fn list_all(&self) -> Result<Vec<CheckinEvent>, AppError>;
    async fn count_by_status(&self) -> Result<HashMap<CheckinSyncStatus, u64>, AppError>;
    /// クラッシュ等で IN_FLIGHT のまま残ったイベントを PENDING に戻す
    async fn requeue_in_flight(&self) -> Result<u64, AppError>;
    async fn prune_acked_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
    async fn max_sequence(&self, device_id: &DeviceId) -> Result<Option<u64>, AppError>;
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}
