//! Connection authentication: issuer key-set cache, bearer credential
//! verification, and the allow/deny decision made before a socket upgrade.

pub mod authorizer;
pub mod key_cache;
pub mod verifier;

pub use authorizer::{ConnectionAuthorizer, ConnectionRequest};
pub use key_cache::{KeySetCache, KeySetError, KeySetSource};
pub use verifier::{TokenVerifier, VerifierPolicy};
