use crate::domain::entities::{BatchAcknowledgement, CheckinEvent, EventOutcome, SyncBatch};
use crate::domain::value_objects::{CheckinEventId, DeviceId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestDto {
    pub device_id: String,
    pub events: Vec<CheckinEventDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckinEventDto {
    pub local_id: String,
    pub site_id: String,
    pub worker_id: String,
    pub location: LocationDto,
    pub claim: ClaimDto,
    /// epoch ミリ秒
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub captured_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimDto {
    pub site_id: String,
    /// epoch 秒
    pub issued_at: i64,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncResponseDto {
    #[serde(default)]
    pub outcomes: Vec<OutcomeDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeDto {
    pub local_id: String,
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Accepted,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl From<&CheckinEvent> for CheckinEventDto {
    fn from(event: &CheckinEvent) -> Self {
        Self {
            local_id: event.id.as_str().to_string(),
            site_id: event.site_id.as_str().to_string(),
            worker_id: event.worker_id.as_str().to_string(),
            location: LocationDto {
                latitude: event.location.latitude,
                longitude: event.location.longitude,
                accuracy_m: event.location.accuracy_m,
                captured_at: event.location.captured_at.timestamp_millis(),
            },
            claim: ClaimDto {
                site_id: event.claim.site_id.as_str().to_string(),
                issued_at: event.claim.issued_at.timestamp(),
                signature: event.claim.signature.clone(),
            },
            created_at: event.created_at.timestamp_millis(),
        }
    }
}

impl SyncRequestDto {
    pub fn from_batch(device_id: &DeviceId, batch: &SyncBatch) -> Self {
        Self {
            device_id: device_id.as_str().to_string(),
            events: batch.events.iter().map(CheckinEventDto::from).collect(),
        }
    }
}

impl SyncResponseDto {
    /// バッチに含まれない ID の判定は捨てる
    pub fn into_acknowledgement(self, batch: &SyncBatch) -> BatchAcknowledgement {
        let known: HashSet<CheckinEventId> = batch.event_ids().into_iter().collect();
        let mut ack = BatchAcknowledgement::new();

        for outcome in self.outcomes {
            let id = match CheckinEventId::parse(&outcome.local_id) {
                Ok(id) if known.contains(&id) => id,
                _ => {
                    tracing::warn!(
                        target: "sync::wire",
                        local_id = %outcome.local_id,
                        "Ignoring outcome for event outside the batch"
                    );
                    continue;
                }
            };
            let mapped = match outcome.status {
                RemoteStatus::Accepted => EventOutcome::Accepted,
                RemoteStatus::Rejected => EventOutcome::Rejected {
                    reason: outcome
                        .reason
                        .filter(|reason| !reason.trim().is_empty())
                        .unwrap_or_else(|| "rejected by remote".to_string()),
                },
                RemoteStatus::Unknown => EventOutcome::Unknown,
            };
            ack.insert(id, mapped);
        }

        ack
    }
}
