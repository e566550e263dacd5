//! Business logic and port traits for Lorekeeper.
//!
//! This crate defines the "ports" (store, search and delivery traits) that the
//! infrastructure layer implements. It depends only on `lorekeeper-types` --
//! never on `lorekeeper-infra` or any database/IO crate.

pub mod agent;
pub mod auth;
pub mod chat;
pub mod connection;
pub mod delivery;
pub mod llm;
pub mod tools;
