//! LanceDB-backed campaign index.
//!
//! Implements `CampaignSearch` from `lorekeeper-core`. All users share the
//! `campaign_chunks` table; every query is filtered by `user_id` and
//! `campaign`, so a search can never surface another user's material.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};

use lorekeeper_core::tools::search::CampaignSearch;
use lorekeeper_types::error::{RepositoryError, ToolError};
use lorekeeper_types::tool::SearchHit;

use super::embedder::{EmbedPurpose, Embedder};
use super::lance::LanceVectorStore;
use super::schema::{CAMPAIGN_CHUNKS_TABLE, EMBEDDING_DIMENSION, campaign_chunks_schema};

/// Campaign chunk index: writes chunk vectors and answers scoped searches.
pub struct LanceCampaignIndex<E: Embedder> {
    store: LanceVectorStore,
    embedder: E,
}

/// Quote a value as a SQL string literal for a LanceDB filter.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn scope_filter(user_id: &str, campaign: &str) -> String {
    format!(
        "user_id = {} AND campaign = {}",
        sql_literal(user_id),
        sql_literal(campaign)
    )
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, String> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| format!("column '{name}' missing or not Utf8"))
}

impl<E: Embedder> LanceCampaignIndex<E> {
    pub fn new(store: LanceVectorStore, embedder: E) -> Self {
        Self { store, embedder }
    }

    async fn table(&self) -> Result<lancedb::Table, RepositoryError> {
        self.store
            .ensure_table(CAMPAIGN_CHUNKS_TABLE, Arc::new(campaign_chunks_schema()))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to ensure chunk table: {e}")))
    }

    /// Replace every chunk previously indexed for one file.
    ///
    /// Returns the number of chunks written. An empty `chunks` slice simply
    /// removes the file from the index.
    pub async fn replace_file_chunks(
        &self,
        user_id: &str,
        campaign: &str,
        file_path: &str,
        category: Option<&str>,
        chunks: &[String],
    ) -> Result<usize, RepositoryError> {
        let table = self.table().await?;
        let file_filter = format!(
            "{} AND file_path = {}",
            scope_filter(user_id, campaign),
            sql_literal(file_path)
        );
        table
            .delete(&file_filter)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to delete old chunks: {e}")))?;

        if chunks.is_empty() {
            return Ok(0);
        }

        let vectors = self
            .embedder
            .embed(chunks, EmbedPurpose::Document)
            .await
            .map_err(|e| RepositoryError::Query(format!("Embedding failed: {e}")))?;

        let batch = self.build_record_batch(user_id, campaign, file_path, category, chunks, &vectors)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to add chunks: {e}")))?;

        tracing::debug!(user_id, campaign, file_path, chunks = chunks.len(), "file chunks replaced");
        Ok(chunks.len())
    }

    /// Number of chunks indexed for one campaign.
    pub async fn count(&self, user_id: &str, campaign: &str) -> Result<usize, RepositoryError> {
        if !self.store.table_exists(CAMPAIGN_CHUNKS_TABLE).await {
            return Ok(0);
        }
        self.table()
            .await?
            .count_rows(Some(scope_filter(user_id, campaign)))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count chunks: {e}")))
    }

    fn build_record_batch(
        &self,
        user_id: &str,
        campaign: &str,
        file_path: &str,
        category: Option<&str>,
        chunks: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<RecordBatch, RepositoryError> {
        let rows = chunks.len();
        if vectors.iter().any(|v| v.len() != EMBEDDING_DIMENSION as usize) {
            return Err(RepositoryError::Query(format!(
                "embedding dimension mismatch: expected {EMBEDDING_DIMENSION}"
            )));
        }

        let chunk_ids: Vec<String> = (0..rows)
            .map(|i| format!("{user_id}/{campaign}/{file_path}#{i}"))
            .collect();
        let values = Float32Array::from(vectors.concat());
        let item = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::new(item, EMBEDDING_DIMENSION, Arc::new(values), None);

        RecordBatch::try_new(
            Arc::new(campaign_chunks_schema()),
            vec![
                Arc::new(StringArray::from(chunk_ids)),
                Arc::new(StringArray::from(vec![user_id; rows])),
                Arc::new(StringArray::from(vec![campaign; rows])),
                Arc::new(StringArray::from(vec![file_path; rows])),
                Arc::new(StringArray::from(vec![category; rows])),
                Arc::new(Int32Array::from_iter_values(0..rows as i32)),
                Arc::new(StringArray::from(chunks.to_vec())),
                Arc::new(StringArray::from(vec![self.embedder.model_name(); rows])),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| RepositoryError::Query(format!("Failed to build record batch: {e}")))
    }

    fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>, String> {
        let file_path = string_column(batch, "file_path")?;
        let category = string_column(batch, "category")?;
        let chunk_text = string_column(batch, "chunk_text")?;
        let distance = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        Ok((0..batch.num_rows())
            .map(|i| SearchHit {
                file_path: file_path.value(i).to_string(),
                category: (!category.is_null(i)).then(|| category.value(i).to_string()),
                chunk_text: chunk_text.value(i).to_string(),
                distance: distance.map_or(0.0, |d| d.value(i)),
            })
            .collect())
    }
}

impl<E: Embedder> CampaignSearch for LanceCampaignIndex<E> {
    async fn search(
        &self,
        user_id: &str,
        campaign: &str,
        query: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>, ToolError> {
        if top_k == 0 || !self.store.table_exists(CAMPAIGN_CHUNKS_TABLE).await {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()], EmbedPurpose::Query)
            .await
            .map_err(|e| ToolError::Upstream(format!("embedding failed: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::Upstream("embedding service returned no vector".to_string()))?;

        let mut filter = scope_filter(user_id, campaign);
        if let Some(category) = category {
            filter.push_str(&format!(" AND category = {}", sql_literal(category)));
        }

        let table = self
            .table()
            .await
            .map_err(|e| ToolError::Upstream(e.to_string()))?;
        let results = table
            .vector_search(query_vector)
            .map_err(|e| ToolError::Upstream(format!("vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(filter)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| ToolError::Upstream(format!("vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| ToolError::Upstream(format!("failed to collect results: {e}")))?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(Self::batch_to_hits(batch).map_err(ToolError::Upstream)?);
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);

        tracing::debug!(user_id, campaign, ?category, hits = hits.len(), "campaign search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use lorekeeper_types::llm::LlmError;

    use super::*;

    /// Embeds each text as a spike on the bucket of its first word.
    struct KeywordEmbedder;

    impl Embedder for KeywordEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            _purpose: EmbedPurpose,
        ) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let word = text.split_whitespace().next().unwrap_or("").to_lowercase();
                    let bucket = word.bytes().map(usize::from).sum::<usize>()
                        % EMBEDDING_DIMENSION as usize;
                    let mut v = vec![0.01; EMBEDDING_DIMENSION as usize];
                    v[bucket] = 1.0;
                    v
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    async fn index() -> (tempfile::TempDir, LanceCampaignIndex<KeywordEmbedder>) {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceVectorStore::new(dir.path().to_path_buf()).await.unwrap();
        (dir, LanceCampaignIndex::new(store, KeywordEmbedder))
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_search_before_indexing_is_empty() {
        let (_dir, index) = index().await;
        let hits = index.search("u1", "c1", "dragon", 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_user_and_campaign() {
        let (_dir, index) = index().await;
        index
            .replace_file_chunks("u1", "c1", "npcs/mira.md", Some("npcs"), &texts(&["dragon lair"]))
            .await
            .unwrap();
        index
            .replace_file_chunks("u2", "c1", "npcs/mira.md", Some("npcs"), &texts(&["dragon hoard"]))
            .await
            .unwrap();
        index
            .replace_file_chunks("u1", "c2", "lore.md", None, &texts(&["dragon egg"]))
            .await
            .unwrap();

        let hits = index.search("u1", "c1", "dragon", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_text, "dragon lair");
        assert_eq!(hits[0].category.as_deref(), Some("npcs"));
    }

    #[tokio::test]
    async fn test_search_orders_by_distance_and_respects_top_k() {
        let (_dir, index) = index().await;
        index
            .replace_file_chunks(
                "u1",
                "c1",
                "world/setting.md",
                Some("world"),
                &texts(&["harbor city", "dragon mountain", "forest road"]),
            )
            .await
            .unwrap();

        let hits = index.search("u1", "c1", "dragon", 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_text, "dragon mountain");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_category_filter() {
        let (_dir, index) = index().await;
        index
            .replace_file_chunks("u1", "c1", "npcs/vex.md", Some("npcs"), &texts(&["dragon rider"]))
            .await
            .unwrap();
        index
            .replace_file_chunks("u1", "c1", "sessions/s1.md", Some("sessions"), &texts(&["dragon fight"]))
            .await
            .unwrap();

        let hits = index.search("u1", "c1", "dragon", 5, Some("sessions")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "sessions/s1.md");
    }

    #[tokio::test]
    async fn test_replace_drops_previous_chunks_of_file() {
        let (_dir, index) = index().await;
        index
            .replace_file_chunks("u1", "c1", "lore.md", None, &texts(&["one", "two", "three"]))
            .await
            .unwrap();
        assert_eq!(index.count("u1", "c1").await.unwrap(), 3);

        let written = index
            .replace_file_chunks("u1", "c1", "lore.md", None, &texts(&["only"]))
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(index.count("u1", "c1").await.unwrap(), 1);

        index.replace_file_chunks("u1", "c1", "lore.md", None, &[]).await.unwrap();
        assert_eq!(index.count("u1", "c1").await.unwrap(), 0);
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("o'brien"), "'o''brien'");
        assert_eq!(
            scope_filter("u1", "it's"),
            "user_id = 'u1' AND campaign = 'it''s'"
        );
    }
}
