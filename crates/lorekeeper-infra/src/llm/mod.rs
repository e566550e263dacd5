//! LLM provider implementations.
//!
//! Both generation tiers run on AWS Bedrock; the planning and synthesis
//! models differ only by the `model` field of each request, so one provider
//! instance serves the whole agent loop.

pub mod bedrock;

use secrecy::SecretString;

use lorekeeper_core::llm::box_provider::BoxLlmProvider;
use lorekeeper_types::llm::LlmError;

use self::bedrock::{BedrockEndpoint, BedrockProvider};

/// Build the shared Bedrock endpoint from the bearer token and region.
pub fn bedrock_endpoint(api_key: SecretString, region: &str) -> Result<BedrockEndpoint, LlmError> {
    BedrockEndpoint::new(api_key, region.to_string())
}

/// Create the type-erased provider the orchestrator drives.
pub fn create_provider(endpoint: &BedrockEndpoint) -> BoxLlmProvider {
    BoxLlmProvider::new(BedrockProvider::new(endpoint.clone()))
}
