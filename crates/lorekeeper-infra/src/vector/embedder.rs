//! Text embedding via Bedrock-hosted Cohere models.
//!
//! Cohere embeddings are asymmetric: documents and queries are embedded with
//! different `input_type`s, so callers say which side they are on.

use lorekeeper_types::llm::LlmError;

use crate::llm::bedrock::BedrockEndpoint;
use crate::llm::bedrock::types::{EmbedRequest, EmbedResponse};

/// Cohere accepts at most this many texts per invoke call.
const MAX_BATCH: usize = 96;

/// Which side of a search an embedding is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPurpose {
    Document,
    Query,
}

impl EmbedPurpose {
    fn input_type(self) -> &'static str {
        match self {
            EmbedPurpose::Document => "search_document",
            EmbedPurpose::Query => "search_query",
        }
    }
}

/// Turns text into fixed-dimension vectors.
pub trait Embedder: Send + Sync {
    /// Embed texts, returning one vector per input in the same order.
    fn embed(
        &self,
        texts: &[String],
        purpose: EmbedPurpose,
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Model identifier stored next to each vector.
    fn model_name(&self) -> &str;
}

impl<T: Embedder> Embedder for std::sync::Arc<T> {
    async fn embed(&self, texts: &[String], purpose: EmbedPurpose) -> Result<Vec<Vec<f32>>, LlmError> {
        self.as_ref().embed(texts, purpose).await
    }

    fn model_name(&self) -> &str {
        self.as_ref().model_name()
    }
}

/// Embedder calling a Cohere model through the Bedrock invoke API.
pub struct BedrockEmbedder {
    endpoint: BedrockEndpoint,
    model: String,
}

impl BedrockEmbedder {
    pub fn new(endpoint: BedrockEndpoint, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
        }
    }

    fn request(batch: &[String], purpose: EmbedPurpose) -> EmbedRequest {
        EmbedRequest {
            texts: batch.to_vec(),
            input_type: purpose.input_type().to_string(),
            truncate: "END".to_string(),
        }
    }
}

impl Embedder for BedrockEmbedder {
    async fn embed(&self, texts: &[String], purpose: EmbedPurpose) -> Result<Vec<Vec<f32>>, LlmError> {
        let url = self.endpoint.url(&self.model, "invoke");
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            let response = self
                .endpoint
                .post_json(&url, &Self::request(batch, purpose))
                .await?;
            let parsed: EmbedResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Deserialization(format!("failed to parse embeddings: {e}")))?;

            if parsed.embeddings.len() != batch.len() {
                return Err(LlmError::Deserialization(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    parsed.embeddings.len()
                )));
            }
            vectors.extend(parsed.embeddings);
        }

        tracing::debug!(model = %self.model, count = vectors.len(), ?purpose, "texts embedded");
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_request_input_type_follows_purpose() {
        let texts = vec!["The Sunken Keep".to_string()];
        let doc = BedrockEmbedder::request(&texts, EmbedPurpose::Document);
        let query = BedrockEmbedder::request(&texts, EmbedPurpose::Query);

        assert_eq!(doc.input_type, "search_document");
        assert_eq!(query.input_type, "search_query");
        assert_eq!(serde_json::to_value(&doc).unwrap()["truncate"], "END");
    }

    #[test]
    fn test_model_name_and_url() {
        let endpoint =
            BedrockEndpoint::new(SecretString::from("k".to_string()), "us-east-1".to_string())
                .unwrap();
        let embedder = BedrockEmbedder::new(endpoint.clone(), "cohere.embed-english-v3");
        assert_eq!(embedder.model_name(), "cohere.embed-english-v3");
        assert_eq!(
            endpoint.url(embedder.model_name(), "invoke"),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/cohere.embed-english-v3/invoke"
        );
    }
}
