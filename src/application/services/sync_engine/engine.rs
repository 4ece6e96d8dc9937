use super::backoff::Backoff;
use super::status::SyncStatusSnapshot;
use crate::application::ports::event_store::{EventStore, StatusUpdate, StoreChange};
use crate::application::ports::sync_transport::{SyncTransport, TransportError};
use crate::domain::entities::{CheckinEvent, EventOutcome, SyncBatch};
use crate::domain::value_objects::CheckinSyncStatus;
use crate::shared::config::{StorageConfig, SyncConfig};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub batch_size: u32,
    pub max_retry: u32,
    pub request_timeout: Duration,
    pub idle_interval: Duration,
    pub retention: chrono::Duration,
}

impl SyncOptions {
    pub fn from_config(sync: &SyncConfig, storage: &StorageConfig) -> Self {
        Self {
            batch_size: sync.batch_size.max(1),
            max_retry: sync.max_retry,
            request_timeout: sync.request_timeout(),
            idle_interval: sync.idle_interval(),
            retention: storage.retention(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCounts {
    pub sent: usize,
    pub acked: usize,
    pub rejected: usize,
    pub requeued: usize,
    pub failed_permanent: usize,
}

/// 一回の同期パスの結果。
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPass {
    /// 送信対象なし
    Idle,
    /// 少なくとも一件は確定した判定を受け取った
    Completed(PassCounts),
    /// 送信失敗、または確定した判定が一件もなかった
    Failed {
        counts: PassCounts,
        error: String,
        retry_in: Duration,
    },
}

enum Wake {
    Run,
    Stop,
}

/// PENDING のイベントをバッチで送信し、判定に応じて状態を進める。
pub struct SyncEngine {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn SyncTransport>,
    options: SyncOptions,
    backoff: Mutex<Backoff>,
    pass_gate: Mutex<()>,
    status: Arc<RwLock<SyncStatusSnapshot>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn SyncTransport>,
        options: SyncOptions,
        backoff: Backoff,
    ) -> Self {
        Self {
            store,
            transport,
            options,
            backoff: Mutex::new(backoff),
            pass_gate: Mutex::new(()),
            status: Arc::new(RwLock::new(SyncStatusSnapshot::default())),
        }
    }

    pub async fn status(&self) -> SyncStatusSnapshot {
        self.status.read().await.clone()
    }

    /// 前回の実行中に IN_FLIGHT のまま残ったイベントを戻す
    pub async fn recover(&self) -> Result<u64, AppError> {
        let _pass = self.pass_gate.lock().await;
        let requeued = self.store.requeue_in_flight().await?;
        if requeued > 0 {
            tracing::info!(target: "sync::engine", requeued, "Requeued interrupted events");
        }
        self.refresh_pending().await?;
        Ok(requeued)
    }

    /// 保持期間を過ぎた ACKED イベントを削除する
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let cutoff = now - self.options.retention;
        let pruned = self.store.prune_acked_before(cutoff).await?;
        if pruned > 0 {
            tracing::debug!(target: "sync::engine", pruned, "Pruned acknowledged events");
        }
        Ok(pruned)
    }

    pub async fn run_once(&self) -> Result<SyncPass, AppError> {
        let _pass = self.pass_gate.lock().await;

        let events = self
            .store
            .list_by_status(CheckinSyncStatus::Pending, self.options.batch_size)
            .await?;
        if events.is_empty() {
            self.refresh_pending().await?;
            return Ok(SyncPass::Idle);
        }

        let attempt_at = Utc::now();
        let in_flight = events
            .iter()
            .map(|event| StatusUpdate {
                id: event.id.clone(),
                status: CheckinSyncStatus::InFlight,
                retry_count: event.sync.retry_count,
                last_attempt_at: Some(attempt_at),
                reason: event.sync.reason.clone(),
            })
            .collect();
        self.store.update_statuses(in_flight).await?;
        self.status.write().await.is_syncing = true;

        let batch = SyncBatch::new(events);
        tracing::debug!(
            target: "sync::engine",
            batch_id = %batch.batch_id,
            size = batch.len(),
            "Sending batch"
        );

        let result = match tokio::time::timeout(
            self.options.request_timeout,
            self.transport.send_batch(&batch),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        let pass = match result {
            Ok(ack) => {
                let mut counts = PassCounts {
                    sent: batch.len(),
                    ..PassCounts::default()
                };
                let updates = batch
                    .events
                    .iter()
                    .map(|event| {
                        let update = self.outcome_update(event, ack.outcome_for(&event.id), attempt_at);
                        match update.status {
                            CheckinSyncStatus::Acked => counts.acked += 1,
                            CheckinSyncStatus::RejectedRemote => counts.rejected += 1,
                            CheckinSyncStatus::FailedPermanent => counts.failed_permanent += 1,
                            _ => counts.requeued += 1,
                        }
                        update
                    })
                    .collect();
                self.apply(updates).await?;

                if counts.acked + counts.rejected > 0 {
                    self.record_success(counts).await
                } else {
                    self.record_failure(counts, "no definitive outcome in response".to_string())
                        .await
                }
            }
            Err(err) => {
                let reason = err.to_string();
                let mut counts = PassCounts {
                    sent: batch.len(),
                    ..PassCounts::default()
                };
                let updates = batch
                    .events
                    .iter()
                    .map(|event| {
                        let update = self.retry_update(event, attempt_at, reason.clone());
                        if update.status == CheckinSyncStatus::FailedPermanent {
                            counts.failed_permanent += 1;
                        } else {
                            counts.requeued += 1;
                        }
                        update
                    })
                    .collect();
                self.apply(updates).await?;
                tracing::warn!(
                    target: "sync::engine",
                    batch_id = %batch.batch_id,
                    error = %err,
                    "Batch delivery failed"
                );
                self.record_failure(counts, reason).await
            }
        };

        self.refresh_pending().await?;
        Ok(pass)
    }

    fn outcome_update(
        &self,
        event: &CheckinEvent,
        outcome: EventOutcome,
        attempt_at: DateTime<Utc>,
    ) -> StatusUpdate {
        match outcome {
            EventOutcome::Accepted => StatusUpdate {
                id: event.id.clone(),
                status: CheckinSyncStatus::Acked,
                retry_count: event.sync.retry_count,
                last_attempt_at: Some(attempt_at),
                reason: None,
            },
            EventOutcome::Rejected { reason } => StatusUpdate {
                id: event.id.clone(),
                status: CheckinSyncStatus::RejectedRemote,
                retry_count: event.sync.retry_count,
                last_attempt_at: Some(attempt_at),
                reason: Some(reason),
            },
            EventOutcome::Unknown => {
                self.retry_update(event, attempt_at, "outcome unknown".to_string())
            }
        }
    }

    fn retry_update(
        &self,
        event: &CheckinEvent,
        attempt_at: DateTime<Utc>,
        reason: String,
    ) -> StatusUpdate {
        let retry_count = event.sync.retry_count.saturating_add(1);
        let status = if retry_count > self.options.max_retry {
            CheckinSyncStatus::FailedPermanent
        } else {
            CheckinSyncStatus::Pending
        };
        StatusUpdate {
            id: event.id.clone(),
            status,
            retry_count,
            last_attempt_at: Some(attempt_at),
            reason: Some(reason),
        }
    }

    async fn apply(&self, updates: Vec<StatusUpdate>) -> Result<(), AppError> {
        if let Err(err) = self.store.update_statuses(updates).await {
            self.status.write().await.is_syncing = false;
            // 判定を書けなかったバッチは PENDING に戻して次のパスで再送する
            match self.store.requeue_in_flight().await {
                Ok(requeued) => tracing::warn!(
                    target: "sync::engine",
                    requeued,
                    error = %err,
                    "Failed to record batch outcome; requeued batch"
                ),
                Err(requeue_err) => tracing::error!(
                    target: "sync::engine",
                    error = %err,
                    requeue_error = %requeue_err,
                    "Failed to record batch outcome and to requeue batch"
                ),
            }
            return Err(err);
        }
        Ok(())
    }

    async fn record_success(&self, counts: PassCounts) -> SyncPass {
        self.backoff.lock().await.reset();
        let mut status = self.status.write().await;
        status.is_syncing = false;
        status.last_sync = Some(Utc::now());
        status.consecutive_failures = 0;
        status.next_attempt_at = None;
        status.last_error = None;
        drop(status);

        tracing::info!(
            target: "sync::engine",
            sent = counts.sent,
            acked = counts.acked,
            rejected = counts.rejected,
            requeued = counts.requeued,
            failed_permanent = counts.failed_permanent,
            "Sync pass completed"
        );
        SyncPass::Completed(counts)
    }

    async fn record_failure(&self, counts: PassCounts, error: String) -> SyncPass {
        let retry_in = self.note_failure(error.clone()).await;
        SyncPass::Failed {
            counts,
            error,
            retry_in,
        }
    }

    /// バックオフを進めて状態スナップショットに反映し、次の試行までの待ち時間を返す
    async fn note_failure(&self, error: String) -> Duration {
        let (retry_in, failures) = {
            let mut backoff = self.backoff.lock().await;
            (backoff.record_failure(), backoff.failures())
        };
        let mut status = self.status.write().await;
        status.is_syncing = false;
        status.consecutive_failures = failures;
        status.next_attempt_at = chrono::Duration::from_std(retry_in)
            .ok()
            .map(|delay| Utc::now() + delay);
        status.last_error = Some(error);
        drop(status);

        tracing::debug!(
            target: "sync::engine",
            failures,
            retry_in_ms = retry_in.as_millis() as u64,
            "Backing off"
        );
        retry_in
    }

    async fn refresh_pending(&self) -> Result<(), AppError> {
        let counts = self.store.count_by_status().await?;
        let pending = counts
            .iter()
            .filter(|(status, _)| {
                matches!(
                    status,
                    CheckinSyncStatus::Pending | CheckinSyncStatus::InFlight
                )
            })
            .map(|(_, count)| *count)
            .sum();
        self.status.write().await.pending_events = pending;
        Ok(())
    }

    /// バックグラウンドで同期ループを開始する
    pub fn spawn(self: Arc<Self>) -> SyncEngineHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(stop_rx).await });
        SyncEngineHandle { stop_tx, join }
    }

    async fn run(&self, mut stop: watch::Receiver<bool>) {
        let mut changes = self.store.subscribe();
        if let Err(err) = self.recover().await {
            tracing::error!(target: "sync::engine", error = %err, "Failed to requeue in-flight events");
        }
        tracing::info!(target: "sync::engine", "Sync loop started");

        loop {
            if *stop.borrow() {
                break;
            }

            let (delay, wake_on_append) = match self.run_once().await {
                Ok(SyncPass::Completed(counts))
                    if counts.sent >= self.options.batch_size as usize =>
                {
                    (Duration::ZERO, false)
                }
                Ok(SyncPass::Completed(_)) => (self.options.idle_interval, true),
                Ok(SyncPass::Idle) => {
                    if let Err(err) = self.prune_expired(Utc::now()).await {
                        tracing::warn!(target: "sync::engine", error = %err, "Retention pruning failed");
                    }
                    (self.options.idle_interval, true)
                }
                Ok(SyncPass::Failed { retry_in, .. }) => (retry_in, false),
                Err(err) => {
                    tracing::error!(target: "sync::engine", error = %err, "Sync pass failed");
                    // 前回の requeue も失敗していれば、ここで取り残しを戻す
                    if let Err(requeue_err) = self.recover().await {
                        tracing::warn!(target: "sync::engine", error = %requeue_err, "Requeue after failed pass failed");
                    }
                    (self.note_failure(err.to_string()).await, false)
                }
            };

            if delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            if let Wake::Stop = wait(delay, wake_on_append, &mut stop, &mut changes).await {
                break;
            }
        }

        tracing::info!(target: "sync::engine", "Sync loop stopped");
    }
}

async fn wait(
    delay: Duration,
    mut wake_on_append: bool,
    stop: &mut watch::Receiver<bool>,
    changes: &mut broadcast::Receiver<StoreChange>,
) -> Wake {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return Wake::Run,
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return Wake::Stop;
                }
            }
            change = changes.recv(), if wake_on_append => match change {
                Ok(StoreChange::Appended(_)) | Err(RecvError::Lagged(_)) => return Wake::Run,
                Ok(_) => {}
                Err(RecvError::Closed) => wake_on_append = false,
            },
        }
    }
}

/// 実行中の同期ループの停止ハンドル。
pub struct SyncEngineHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SyncEngineHandle {
    /// 実行中のパスを終えてから停止する
    pub async fn stop(self) -> Result<(), AppError> {
        let _ = self.stop_tx.send(true);
        self.join
            .await
            .map_err(|err| AppError::Internal(format!("sync loop panicked: {err}")))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
