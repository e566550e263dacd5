//! Service configuration types for Lorekeeper.
//!
//! `ServiceConfig` represents the top-level `config.toml`: which models the
//! agent loop uses, loop bounds, credential issuer settings, and storage
//! locations. Every field has a default so an empty file is valid.

use serde::{Deserialize, Serialize};

use crate::chat::DEFAULT_HISTORY_TTL_SECS;
use crate::connection::DEFAULT_CONNECTION_TTL_SECS;

/// Top-level configuration for the Lorekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Model identifiers for the two generation tiers and embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Cheap, deterministic model used to decide on tool calls.
    #[serde(default = "default_planning_model")]
    pub planning_model: String,
    /// Model that writes the streamed answer.
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_planning_model() -> String {
    "us.anthropic.claude-3-5-haiku-20241022-v1:0".to_string()
}

fn default_synthesis_model() -> String {
    "us.anthropic.claude-sonnet-4-20250514-v1:0".to_string()
}

fn default_embedding_model() -> String {
    "cohere.embed-english-v3".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            planning_model: default_planning_model(),
            synthesis_model: default_synthesis_model(),
            embedding_model: default_embedding_model(),
            region: default_region(),
        }
    }
}

/// Bounds and sampling settings for the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of tool-invoking planning rounds per message.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Approximate token budget for replayed conversation history.
    #[serde(default = "default_max_history_tokens")]
    pub max_history_tokens: u32,
    /// Wall-clock limit for handling one message.
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,
    #[serde(default = "default_planning_max_tokens")]
    pub planning_max_tokens: u32,
    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u32,
    #[serde(default = "default_synthesis_temperature")]
    pub synthesis_temperature: f64,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_max_history_tokens() -> u32 {
    4000
}

fn default_invocation_timeout_secs() -> u64 {
    120
}

fn default_planning_max_tokens() -> u32 {
    400
}

fn default_synthesis_max_tokens() -> u32 {
    1500
}

fn default_synthesis_temperature() -> f64 {
    0.6
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_history_tokens: default_max_history_tokens(),
            invocation_timeout_secs: default_invocation_timeout_secs(),
            planning_max_tokens: default_planning_max_tokens(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
            synthesis_temperature: default_synthesis_temperature(),
        }
    }
}

/// Credential issuer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// URL of the issuer's published key set (JWKS).
    #[serde(default)]
    pub jwks_url: String,
    /// Expected `iss` claim; unchecked when absent.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Claim holding the user id (e.g. `sub` or `cognito:username`).
    #[serde(default = "default_identity_claim")]
    pub identity_claim: String,
    /// Accepted signing algorithms, by JOSE name.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,
    /// Minimum seconds between key-set refreshes triggered by unknown key ids.
    #[serde(default = "default_refresh_cooldown_secs")]
    pub refresh_cooldown_secs: u64,
}

fn default_identity_claim() -> String {
    "sub".to_string()
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_string()]
}

fn default_refresh_cooldown_secs() -> u64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: String::new(),
            issuer: None,
            identity_claim: default_identity_claim(),
            algorithms: default_algorithms(),
            refresh_cooldown_secs: default_refresh_cooldown_secs(),
        }
    }
}

/// Storage locations and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the campaign file tree (`{root}/{user}/{campaign}/...`).
    /// Relative paths resolve against the data directory.
    #[serde(default = "default_campaign_files_dir")]
    pub campaign_files_dir: String,
    #[serde(default = "default_vector_store_dir")]
    pub vector_store_dir: String,
    #[serde(default = "default_connection_ttl_secs")]
    pub connection_ttl_secs: i64,
    #[serde(default = "default_history_ttl_secs")]
    pub history_ttl_secs: i64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_campaign_files_dir() -> String {
    "campaigns".to_string()
}

fn default_vector_store_dir() -> String {
    "vector_store".to_string()
}

fn default_connection_ttl_secs() -> i64 {
    DEFAULT_CONNECTION_TTL_SECS
}

fn default_history_ttl_secs() -> i64 {
    DEFAULT_HISTORY_TTL_SECS
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    100
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            campaign_files_dir: default_campaign_files_dir(),
            vector_store_dir: default_vector_store_dir(),
            connection_ttl_secs: default_connection_ttl_secs(),
            history_ttl_secs: default_history_ttl_secs(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}
