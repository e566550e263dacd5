//! HTTP layer for Lorekeeper.
//!
//! Axum router with the chat WebSocket at `/ws`, a small REST API at
//! `/api/v1/` using the same bearer credentials, and the envelope response
//! format.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
