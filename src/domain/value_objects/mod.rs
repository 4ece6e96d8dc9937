pub mod checkin_event_id;
pub mod device_id;
pub mod site_id;
pub mod sync_status;
pub mod worker_id;

pub use checkin_event_id::CheckinEventId;
pub use device_id::DeviceId;
pub use site_id::SiteId;
pub use sync_status::CheckinSyncStatus;
pub use worker_id::WorkerId;
