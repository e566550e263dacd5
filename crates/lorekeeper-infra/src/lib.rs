//! Infrastructure layer for Lorekeeper.
//!
//! Contains implementations of the port traits defined in `lorekeeper-core`:
//! SQLite stores for connections and chat history, the Bedrock LLM provider
//! and embedder, the LanceDB campaign index, the local campaign file store,
//! and the HTTPS key-set source.

pub mod auth;
pub mod config;
pub mod llm;
pub mod sqlite;
pub mod storage;
pub mod vector;
