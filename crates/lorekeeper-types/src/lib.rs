//! Shared domain types for Lorekeeper.
//!
//! This crate contains the domain types used across the Lorekeeper service:
//! credentials and authorization decisions, connection records, chat turns,
//! tool invocations, wire frames, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod auth;
pub mod chat;
pub mod config;
pub mod connection;
pub mod error;
pub mod llm;
pub mod message;
pub mod tool;
