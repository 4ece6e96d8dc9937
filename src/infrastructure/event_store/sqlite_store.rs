use super::mappers::domain_event_from_row;
use super::rows::CheckinEventRow;
use crate::application::ports::event_store::{AppendResult, EventStore, StatusUpdate, StoreChange};
use crate::domain::entities::CheckinEvent;
use crate::domain::value_objects::{CheckinEventId, CheckinSyncStatus, DeviceId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// SQLite 上のチェックインイベントログ。
///
/// 書き込みは `write_gate` で直列化し、読み取りはプールから直接行う。
/// ステータスの一括更新はトランザクション内で適用されるため、
/// 読み手が適用途中のバッチを観測することはない。
pub struct SqliteEventStore {
    pool: SqlitePool,
    write_gate: Mutex<()>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            pool,
            write_gate: Mutex::new(()),
            changes,
        }
    }

    fn notify(&self, change: StoreChange) {
        // 受信者がいない場合のエラーは無視してよい
        let _ = self.changes.send(change);
    }

    async fn fetch_by_local_id(&self, local_id: &str) -> Result<Option<CheckinEvent>, AppError> {
        let row = sqlx::query_as::<_, CheckinEventRow>(
            r#"
            SELECT * FROM checkin_events
            WHERE local_id = ?1
            "#,
        )
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(domain_event_from_row).transpose()
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, event: CheckinEvent) -> Result<AppendResult, AppError> {
        let sequence = i64::try_from(event.id.sequence())
            .map_err(|_| AppError::ValidationError(format!("sequence overflow: {}", event.id)))?;
        let now = Utc::now().timestamp_millis();

        let inserted = {
            let _guard = self.write_gate.lock().await;
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(
                r#"
                INSERT INTO checkin_events (
                    local_id, device_id, device_seq, site_id, worker_id,
                    latitude, longitude, accuracy_m, captured_at,
                    claim_site_id, claim_issued_at, claim_signature,
                    created_at, sync_status, retry_count, last_attempt_at,
                    status_reason, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(event.id.as_str())
            .bind(event.id.device_part())
            .bind(sequence)
            .bind(event.site_id.as_str())
            .bind(event.worker_id.as_str())
            .bind(event.location.latitude)
            .bind(event.location.longitude)
            .bind(event.location.accuracy_m)
            .bind(event.location.captured_at.timestamp_millis())
            .bind(event.claim.site_id.as_str())
            .bind(event.claim.issued_at.timestamp())
            .bind(&event.claim.signature)
            .bind(event.created_at.timestamp_millis())
            .bind(event.sync.status.as_str())
            .bind(i64::from(event.sync.retry_count))
            .bind(event.sync.last_attempt_at.map(|at| at.timestamp_millis()))
            .bind(&event.sync.reason)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            let inserted = result.rows_affected() == 1;

            if inserted {
                // 払い出し済みの連番は、イベントの削除後も保持する
                sqlx::query(
                    r#"
                    INSERT INTO device_sequences (device_id, last_seq) VALUES (?1, ?2)
                    ON CONFLICT(device_id) DO UPDATE SET last_seq = MAX(last_seq, excluded.last_seq)
                    "#,
                )
                .bind(event.id.device_part())
                .bind(sequence)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            inserted
        };

        let stored = self
            .fetch_by_local_id(event.id.as_str())
            .await?
            .ok_or_else(|| AppError::Storage(format!("event {} missing after append", event.id)))?;

        if inserted {
            tracing::debug!(target: "store::sqlite", local_id = %stored.id, "checkin event appended");
            self.notify(StoreChange::Appended(stored.id.clone()));
        } else {
            tracing::debug!(target: "store::sqlite", local_id = %stored.id, "duplicate append ignored");
        }

        Ok(AppendResult {
            event: stored,
            inserted,
        })
    }

    async fn get(&self, id: &CheckinEventId) -> Result<Option<CheckinEvent>, AppError> {
        self.fetch_by_local_id(id.as_str()).await
    }

    async fn update_status(&self, update: StatusUpdate) -> Result<(), AppError> {
        self.update_statuses(vec![update]).await
    }

    async fn update_statuses(&self, updates: Vec<StatusUpdate>) -> Result<(), AppError> {
        if updates.is_empty() {
            return Ok(());
        }
        let now = Utc::now().timestamp_millis();

        {
            let _guard = self.write_gate.lock().await;
            let mut tx = self.pool.begin().await?;

            for update in &updates {
                let result = sqlx::query(
                    r#"
                    UPDATE checkin_events
                    SET sync_status = ?1, retry_count = ?2, last_attempt_at = ?3,
                        status_reason = ?4, updated_at = ?5
                    WHERE local_id = ?6
                    "#,
                )
                .bind(update.status.as_str())
                .bind(i64::from(update.retry_count))
                .bind(update.last_attempt_at.map(|at| at.timestamp_millis()))
                .bind(&update.reason)
                .bind(now)
                .bind(update.id.as_str())
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Err(AppError::NotFound(format!("checkin event {}", update.id)));
                }
            }

            tx.commit().await?;
        }

        let mut grouped: HashMap<CheckinSyncStatus, Vec<CheckinEventId>> = HashMap::new();
        for update in updates {
            grouped.entry(update.status).or_default().push(update.id);
        }
        for (status, ids) in grouped {
            self.notify(StoreChange::StatusChanged { ids, status });
        }

        Ok(())
    }

    async fn list_by_status(
        &self,
        status: CheckinSyncStatus,
        limit: u32,
    ) -> Result<Vec<CheckinEvent>, AppError> {
        let rows = sqlx::query_as::<_, CheckinEventRow>(
            r#"
            SELECT * FROM checkin_events
            WHERE sync_status = ?1
            ORDER BY seq_no ASC
            LIMIT ?2
            "#,
        )
        .bind(status.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(domain_event_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<CheckinEvent>, AppError> {
        let rows = sqlx::query_as::<_, CheckinEventRow>(
            "SELECT * FROM checkin_events ORDER BY seq_no ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(domain_event_from_row).collect()
    }

    async fn count_by_status(&self) -> Result<HashMap<CheckinSyncStatus, u64>, AppError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT sync_status, COUNT(*) as count
            FROM checkin_events
            GROUP BY sync_status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            let status = CheckinSyncStatus::try_from(status.as_str())
                .map_err(AppError::DeserializationError)?;
            counts.insert(status, u64::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn requeue_in_flight(&self) -> Result<u64, AppError> {
        let requeued = {
            let _guard = self.write_gate.lock().await;
            sqlx::query(
                r#"
                UPDATE checkin_events
                SET sync_status = 'pending', updated_at = ?1
                WHERE sync_status = 'in_flight'
                "#,
            )
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if requeued > 0 {
            tracing::info!(target: "store::sqlite", requeued, "in-flight events returned to pending");
            self.notify(StoreChange::Requeued(requeued));
        }
        Ok(requeued)
    }

    async fn prune_acked_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let pruned = {
            let _guard = self.write_gate.lock().await;
            sqlx::query(
                r#"
                DELETE FROM checkin_events
                WHERE sync_status = 'acked' AND updated_at < ?1
                "#,
            )
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if pruned > 0 {
            tracing::info!(target: "store::sqlite", pruned, "acked events past retention removed");
            self.notify(StoreChange::Pruned(pruned));
        }
        Ok(pruned)
    }

    async fn max_sequence(&self, device_id: &DeviceId) -> Result<Option<u64>, AppError> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT last_seq FROM device_sequences WHERE device_id = ?1",
        )
        .bind(device_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(max.and_then(|value| u64::try_from(value).ok()))
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CheckinClaim, LocationSample};
    use crate::domain::value_objects::{SiteId, WorkerId};
    use crate::infrastructure::database::ConnectionPool;
    use chrono::Duration;

    async fn setup_store() -> SqliteEventStore {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        SqliteEventStore::new(pool.get_pool().clone())
    }

    fn device() -> DeviceId {
        DeviceId::new("tablet-01".to_string()).unwrap()
    }

    fn sample_event(sequence: u64, site: &str) -> CheckinEvent {
        let site_id = SiteId::new(site.to_string()).unwrap();
        let claim = CheckinClaim::new(
            site_id,
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            "c2lnbmF0dXJl".to_string(),
        );
        let location = LocationSample::new(4.711, -74.072, 8.0, Utc::now()).unwrap();
        CheckinEvent::new_pending(
            CheckinEventId::new(&device(), sequence),
            WorkerId::new("worker-9".to_string()).unwrap(),
            location,
            claim,
            Utc::now(),
        )
    }

    fn status_update(event: &CheckinEvent, status: CheckinSyncStatus) -> StatusUpdate {
        StatusUpdate {
            id: event.id.clone(),
            status,
            retry_count: 0,
            last_attempt_at: Some(Utc::now()),
            reason: None,
        }
    }

    #[tokio::test]
    async fn append_persists_and_returns_stored_event() {
        let store = setup_store().await;
        let event = sample_event(1, "farm-01");

        let result = store.append(event.clone()).await.unwrap();

        assert!(result.inserted);
        assert_eq!(result.event, event);
        assert_eq!(store.get(&event.id).await.unwrap(), Some(event));
    }

    #[tokio::test]
    async fn duplicate_append_returns_original_unchanged() {
        let store = setup_store().await;
        let original = sample_event(1, "farm-01");
        store.append(original.clone()).await.unwrap();

        let mut retry = sample_event(1, "farm-02");
        retry.location.accuracy_m = 99.0;
        let result = store.append(retry).await.unwrap();

        assert!(!result.inserted);
        assert_eq!(result.event, original);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_by_status_is_oldest_first_and_bounded() {
        let store = setup_store().await;
        for seq in 1..=5 {
            store.append(sample_event(seq, "farm-01")).await.unwrap();
        }

        let pending = store
            .list_by_status(CheckinSyncStatus::Pending, 3)
            .await
            .unwrap();

        let sequences: Vec<u64> = pending.iter().map(|e| e.id.sequence()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn batch_update_is_all_or_nothing() {
        let store = setup_store().await;
        let first = sample_event(1, "farm-01");
        store.append(first.clone()).await.unwrap();
        let missing = sample_event(2, "farm-01");

        let result = store
            .update_statuses(vec![
                status_update(&first, CheckinSyncStatus::Acked),
                status_update(&missing, CheckinSyncStatus::Acked),
            ])
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        let stored = store.get(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), CheckinSyncStatus::Pending);
    }

    #[tokio::test]
    async fn status_update_keeps_business_fields() {
        let store = setup_store().await;
        let event = sample_event(1, "farm-01");
        store.append(event.clone()).await.unwrap();

        let mut update = status_update(&event, CheckinSyncStatus::RejectedRemote);
        update.reason = Some("claim already consumed".to_string());
        store.update_status(update).await.unwrap();

        let stored = store.get(&event.id).await.unwrap().unwrap();
        assert!(stored.same_business_fields(&event));
        assert_eq!(stored.status(), CheckinSyncStatus::RejectedRemote);
        assert_eq!(stored.sync.reason.as_deref(), Some("claim already consumed"));
    }

    #[tokio::test]
    async fn business_fields_cannot_be_rewritten() {
        let store = setup_store().await;
        let event = sample_event(1, "farm-01");
        store.append(event.clone()).await.unwrap();

        let result = sqlx::query("UPDATE checkin_events SET site_id = 'other' WHERE local_id = ?1")
            .bind(event.id.as_str())
            .execute(&store.pool)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn requeue_in_flight_restores_pending() {
        let store = setup_store().await;
        let a = sample_event(1, "farm-01");
        let b = sample_event(2, "farm-01");
        store.append(a.clone()).await.unwrap();
        store.append(b.clone()).await.unwrap();
        store
            .update_statuses(vec![
                status_update(&a, CheckinSyncStatus::InFlight),
                status_update(&b, CheckinSyncStatus::Acked),
            ])
            .await
            .unwrap();

        assert_eq!(store.requeue_in_flight().await.unwrap(), 1);

        assert_eq!(
            store.get(&a.id).await.unwrap().unwrap().status(),
            CheckinSyncStatus::Pending
        );
        assert_eq!(
            store.get(&b.id).await.unwrap().unwrap().status(),
            CheckinSyncStatus::Acked
        );
    }

    #[tokio::test]
    async fn prune_only_removes_acked_events() {
        let store = setup_store().await;
        let acked = sample_event(1, "farm-01");
        let pending = sample_event(2, "farm-01");
        store.append(acked.clone()).await.unwrap();
        store.append(pending.clone()).await.unwrap();
        store
            .update_status(status_update(&acked, CheckinSyncStatus::Acked))
            .await
            .unwrap();

        let pruned = store
            .prune_acked_before(Utc::now() + Duration::seconds(5))
            .await
            .unwrap();

        assert_eq!(pruned, 1);
        let remaining = store.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, pending.id);
    }

    #[tokio::test]
    async fn max_sequence_and_counts() {
        let store = setup_store().await;
        assert_eq!(store.max_sequence(&device()).await.unwrap(), None);
        store.append(sample_event(3, "farm-01")).await.unwrap();
        store.append(sample_event(7, "farm-02")).await.unwrap();

        assert_eq!(store.max_sequence(&device()).await.unwrap(), Some(7));
        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.get(&CheckinSyncStatus::Pending), Some(&2));
    }

    #[tokio::test]
    async fn max_sequence_survives_pruning() {
        let store = setup_store().await;
        let older = store.append(sample_event(1, "farm-01")).await.unwrap().event;
        let newest = store.append(sample_event(2, "farm-01")).await.unwrap().event;
        store
            .update_statuses(vec![
                status_update(&older, CheckinSyncStatus::Acked),
                status_update(&newest, CheckinSyncStatus::Acked),
            ])
            .await
            .unwrap();

        let pruned = store
            .prune_acked_before(Utc::now() + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(pruned, 2);
        assert!(store.list_all().await.unwrap().is_empty());
        assert_eq!(store.max_sequence(&device()).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn subscribers_receive_append_notifications() {
        let store = setup_store().await;
        let mut changes = store.subscribe();
        let event = sample_event(1, "farm-01");

        store.append(event.clone()).await.unwrap();
        store.append(event.clone()).await.unwrap();

        assert_eq!(changes.recv().await.unwrap(), StoreChange::Appended(event.id));
        assert!(changes.try_recv().is_err());
    }
}
