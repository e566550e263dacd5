//! Semantic search port over a user's indexed campaign material.

use lorekeeper_types::error::ToolError;
use lorekeeper_types::tool::SearchHit;

/// Vector-similarity search scoped to one user's campaign.
///
/// Implementations must never return hits outside `(user_id, campaign)`.
/// Implementations live in lorekeeper-infra (e.g., `LanceCampaignIndex`).
pub trait CampaignSearch: Send + Sync {
    fn search(
        &self,
        user_id: &str,
        campaign: &str,
        query: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<SearchHit>, ToolError>> + Send;
}

impl<T: CampaignSearch> CampaignSearch for std::sync::Arc<T> {
    async fn search(
        &self,
        user_id: &str,
        campaign: &str,
        query: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>, ToolError> {
        self.as_ref()
            .search(user_id, campaign, query, top_k, category)
            .await
    }
}

/// Search with an optional category, widening to the whole campaign when
/// the category yields nothing.
pub async fn search_with_fallback<S: CampaignSearch>(
    search: &S,
    user_id: &str,
    campaign: &str,
    query: &str,
    top_k: usize,
    category: Option<&str>,
) -> Result<Vec<SearchHit>, ToolError> {
    let hits = search.search(user_id, campaign, query, top_k, category).await?;
    if hits.is_empty() && category.is_some() {
        tracing::debug!(?category, "no hits in category, retrying across campaign");
        return search.search(user_id, campaign, query, top_k, None).await;
    }
    Ok(hits)
}

/// Render hits as numbered snippets for a prompt or tool result.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] {} (relevance {:.2})\n{}",
                i + 1,
                hit.file_path,
                1.0 - hit.distance,
                hit.chunk_text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
