pub mod claim_signature;

pub use claim_signature::{ClaimSigner, Secp256k1ClaimVerifier};
