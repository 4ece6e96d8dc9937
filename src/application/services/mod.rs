pub mod checkin_codec;
pub mod checkin_coordinator;
pub mod event_id_generator;
pub mod location_tracker;
pub mod report_aggregator;
pub mod sync_engine;

#[cfg(test)]
pub(crate) mod test_support;

pub use checkin_codec::{CheckinCodec, DecodeError};
pub use checkin_coordinator::{CheckinCoordinator, CheckinError};
pub use event_id_generator::EventIdGenerator;
pub use location_tracker::LocationTracker;
pub use report_aggregator::{CheckinReport, ReportAggregator, ReportFeed, SiteSummary, StatusCounts};
pub use sync_engine::{SyncEngine, SyncEngineHandle, SyncOptions, SyncPass, SyncStatusSnapshot};
