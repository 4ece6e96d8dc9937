pub mod claim_verifier;
pub mod credential_provider;
pub mod event_store;
pub mod location_provider;
pub mod site_directory;
pub mod sync_transport;

pub use claim_verifier::{ClaimVerifier, SignatureError};
pub use credential_provider::{CredentialProvider, StaticCredential};
pub use event_store::{AppendResult, EventStore, StatusUpdate, StoreChange};
pub use location_provider::LocationProvider;
pub use site_directory::SiteDirectory;
pub use sync_transport::{SyncTransport, TransportError};
