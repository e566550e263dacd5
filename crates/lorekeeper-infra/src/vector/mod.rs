//! Vector search over campaign material.
//!
//! LanceDB stores chunk vectors (see [`schema`]); a Bedrock-hosted Cohere
//! model produces them. [`campaign::LanceCampaignIndex`] ties both together
//! and serves the `search_campaign` tool.

pub mod campaign;
pub mod embedder;
pub mod lance;
pub mod schema;
