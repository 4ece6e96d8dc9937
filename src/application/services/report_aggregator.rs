use crate::application::ports::event_store::EventStore;
use crate::domain::entities::CheckinEvent;
use crate::domain::value_objects::{CheckinSyncStatus, SiteId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub in_flight: u64,
    pub acked: u64,
    pub rejected_remote: u64,
    pub failed_permanent: u64,
}

impl StatusCounts {
    fn record(&mut self, status: CheckinSyncStatus) {
        match status {
            CheckinSyncStatus::Pending => self.pending += 1,
            CheckinSyncStatus::InFlight => self.in_flight += 1,
            CheckinSyncStatus::Acked => self.acked += 1,
            CheckinSyncStatus::RejectedRemote => self.rejected_remote += 1,
            CheckinSyncStatus::FailedPermanent => self.failed_permanent += 1,
        }
    }

    pub fn get(&self, status: CheckinSyncStatus) -> u64 {
        match status {
            CheckinSyncStatus::Pending => self.pending,
            CheckinSyncStatus::InFlight => self.in_flight,
            CheckinSyncStatus::Acked => self.acked,
            CheckinSyncStatus::RejectedRemote => self.rejected_remote,
            CheckinSyncStatus::FailedPermanent => self.failed_permanent,
        }
    }

    pub fn total(&self) -> u64 {
        CheckinSyncStatus::ALL.iter().map(|status| self.get(*status)).sum()
    }

    /// まだサーバーに届いていない件数
    pub fn unsynced(&self) -> u64 {
        self.pending + self.in_flight
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub site_id: SiteId,
    pub counts: StatusCounts,
    pub last_checkin_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub start: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinReport {
    pub generated_at: DateTime<Utc>,
    pub by_status: StatusCounts,
    pub by_site: Vec<SiteSummary>,
    /// 作成時刻をウィンドウ幅で区切った件数（古い順）
    pub by_window: Vec<TimeBucket>,
}

impl CheckinReport {
    pub fn total(&self) -> u64 {
        self.by_status.total()
    }

    /// イベント一覧から集計する。ウィンドウ幅が 0 以下なら時間別集計は空。
    pub fn from_events(events: &[CheckinEvent], window: chrono::Duration, now: DateTime<Utc>) -> Self {
        let mut by_status = StatusCounts::default();
        let mut sites: BTreeMap<SiteId, SiteSummary> = BTreeMap::new();
        let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
        let window_ms = window.num_milliseconds();

        for event in events {
            by_status.record(event.status());

            let site = sites.entry(event.site_id.clone()).or_insert_with(|| SiteSummary {
                site_id: event.site_id.clone(),
                counts: StatusCounts::default(),
                last_checkin_at: None,
            });
            site.counts.record(event.status());
            if site.last_checkin_at.map_or(true, |last| event.created_at > last) {
                site.last_checkin_at = Some(event.created_at);
            }

            if window_ms > 0 {
                let start = event.created_at.timestamp_millis().div_euclid(window_ms) * window_ms;
                *buckets.entry(start).or_insert(0) += 1;
            }
        }

        let by_window = buckets
            .into_iter()
            .filter_map(|(start, count)| {
                DateTime::from_timestamp_millis(start).map(|start| TimeBucket { start, count })
            })
            .collect();

        Self {
            generated_at: now,
            by_status,
            by_site: sites.into_values().collect(),
            by_window,
        }
    }
}

/// ストアのスナップショットから集計をその都度計算する。
pub struct ReportAggregator {
    store: Arc<dyn EventStore>,
    window: chrono::Duration,
}

/// 集計の購読先。ストアが変わるたびに最新の集計が届く。
pub struct ReportFeed {
    pub receiver: watch::Receiver<CheckinReport>,
    pub task: JoinHandle<()>,
}

impl ReportAggregator {
    pub fn new(store: Arc<dyn EventStore>, window: chrono::Duration) -> Self {
        Self { store, window }
    }

    pub async fn summarize(&self) -> Result<CheckinReport, AppError> {
        let events = self.store.list_all().await?;
        Ok(CheckinReport::from_events(&events, self.window, Utc::now()))
    }

    pub async fn summarize_site(&self, site_id: &SiteId) -> Result<Option<SiteSummary>, AppError> {
        Ok(self
            .summarize()
            .await?
            .by_site
            .into_iter()
            .find(|summary| &summary.site_id == site_id))
    }

    /// 変更通知ごとに再集計して配信する。購読者がいなくなるかストアが閉じると終了する。
    pub async fn spawn_live(self: Arc<Self>) -> Result<ReportFeed, AppError> {
        let mut changes = self.store.subscribe();
        let initial = self.summarize().await?;
        let (tx, receiver) = watch::channel(initial);

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
                if tx.is_closed() {
                    break;
                }
                match self.summarize().await {
                    Ok(report) => {
                        if tx.send(report).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(target: "report::aggregator", error = %err, "Failed to refresh report");
                    }
                }
            }
        });

        Ok(ReportFeed { receiver, task })
    }
}
