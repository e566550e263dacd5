//! Credential issuer adapters.

pub mod jwks;

pub use jwks::HttpKeySetSource;
