use crate::application::ports::event_store::EventStore;
use crate::domain::value_objects::{CheckinEventId, DeviceId};
use crate::shared::error::AppError;
use std::sync::atomic::{AtomicU64, Ordering};

/// 端末内で単調増加するローカル ID を払い出す。
pub struct EventIdGenerator {
    device_id: DeviceId,
    next: AtomicU64,
}

impl EventIdGenerator {
    /// `last_sequence` の次から払い出す
    pub fn new(device_id: DeviceId, last_sequence: u64) -> Self {
        Self {
            device_id,
            next: AtomicU64::new(last_sequence.saturating_add(1)),
        }
    }

    /// 再起動後も ID が重複しないよう、保存済みの最大連番から再開する
    pub async fn resume(device_id: DeviceId, store: &dyn EventStore) -> Result<Self, AppError> {
        let last = store.max_sequence(&device_id).await?.unwrap_or(0);
        tracing::debug!(device_id = %device_id, last_sequence = last, "Resuming event id sequence");
        Ok(Self::new(device_id, last))
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn next_id(&self) -> CheckinEventId {
        let sequence = self.next.fetch_add(1, Ordering::SeqCst);
        CheckinEventId::new(&self.device_id, sequence)
    }
}
