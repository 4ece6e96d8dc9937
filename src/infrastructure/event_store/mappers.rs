use super::rows::CheckinEventRow;
use crate::domain::entities::{CheckinClaim, CheckinEvent, LocationSample, SyncMetadata};
use crate::domain::value_objects::{CheckinEventId, CheckinSyncStatus, SiteId, WorkerId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};

pub fn domain_event_from_row(row: CheckinEventRow) -> Result<CheckinEvent, AppError> {
    let id = CheckinEventId::parse(&row.local_id).map_err(AppError::DeserializationError)?;
    let site_id = SiteId::new(row.site_id).map_err(AppError::DeserializationError)?;
    let worker_id = WorkerId::new(row.worker_id).map_err(AppError::DeserializationError)?;
    let claim_site_id = SiteId::new(row.claim_site_id).map_err(AppError::DeserializationError)?;

    let location = LocationSample {
        latitude: row.latitude,
        longitude: row.longitude,
        accuracy_m: row.accuracy_m,
        captured_at: millis_to_datetime(row.captured_at, "captured_at")?,
    };

    let claim = CheckinClaim::new(
        claim_site_id,
        DateTime::from_timestamp(row.claim_issued_at, 0).ok_or_else(|| {
            AppError::DeserializationError(format!(
                "invalid claim_issued_at: {}",
                row.claim_issued_at
            ))
        })?,
        row.claim_signature,
    );

    let status = CheckinSyncStatus::try_from(row.sync_status.as_str())
        .map_err(AppError::DeserializationError)?;

    Ok(CheckinEvent {
        id,
        site_id,
        worker_id,
        location,
        claim,
        created_at: millis_to_datetime(row.created_at, "created_at")?,
        sync: SyncMetadata {
            status,
            retry_count: u32::try_from(row.retry_count.max(0)).unwrap_or(u32::MAX),
            last_attempt_at: row
                .last_attempt_at
                .map(|value| millis_to_datetime(value, "last_attempt_at"))
                .transpose()?,
            reason: row.status_reason,
        },
    })
}

pub fn millis_to_datetime(value: i64, field: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| AppError::DeserializationError(format!("invalid {field}: {value}")))
}
