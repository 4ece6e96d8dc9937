pub mod crypto;
pub mod database;
pub mod event_store;
pub mod site_directory;
pub mod sync;

pub use site_directory::StaticSiteDirectory;
