pub mod checkin_claim;
pub mod checkin_event;
pub mod location_sample;
pub mod site_geofence;
pub mod sync_batch;

pub use checkin_claim::CheckinClaim;
pub use checkin_event::{CheckinEvent, SyncMetadata};
pub use location_sample::LocationSample;
pub use site_geofence::SiteGeofence;
pub use sync_batch::{BatchAcknowledgement, EventOutcome, SyncBatch};
