use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckinEventRow {
    pub seq_no: i64,
    pub local_id: String,
    pub device_id: String,
    pub device_seq: i64,
    pub site_id: String,
    pub worker_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub captured_at: i64,
    pub claim_site_id: String,
    pub claim_issued_at: i64,
    pub claim_signature: String,
    pub created_at: i64,
    pub sync_status: String,
    pub retry_count: i64,
    pub last_attempt_at: Option<i64>,
    pub status_reason: Option<String>,
    pub updated_at: i64,
}
