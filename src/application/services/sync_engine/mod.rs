mod backoff;
mod engine;
mod status;

pub use backoff::Backoff;
pub use engine::{PassCounts, SyncEngine, SyncEngineHandle, SyncOptions, SyncPass};
pub use status::SyncStatusSnapshot;
