pub mod http_transport;
pub mod wire;

pub use http_transport::HttpSyncTransport;
