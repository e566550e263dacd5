//! Campaign indexer for semantic search.
//!
//! Walks a campaign's files, chunks every text file and replaces that file's
//! vectors in the index. Non-text files are skipped.

use lorekeeper_core::tools::files::{CampaignFileStore, category_of};
use lorekeeper_types::error::RepositoryError;

use super::chunker::TextChunker;
use super::{detect_mime, is_text_mime};
use crate::vector::campaign::LanceCampaignIndex;
use crate::vector::embedder::Embedder;

/// Outcome of indexing one campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_written: usize,
}

/// Chunk-and-embed pipeline from a file store into the campaign index.
pub struct CampaignIndexer<F: CampaignFileStore, E: Embedder> {
    files: F,
    index: LanceCampaignIndex<E>,
    chunker: TextChunker,
}

impl<F: CampaignFileStore, E: Embedder> CampaignIndexer<F, E> {
    pub fn new(files: F, index: LanceCampaignIndex<E>, chunker: TextChunker) -> Self {
        Self {
            files,
            index,
            chunker,
        }
    }

    pub fn index(&self) -> &LanceCampaignIndex<E> {
        &self.index
    }

    /// Re-index every file of one campaign.
    pub async fn index_campaign(
        &self,
        user_id: &str,
        campaign: &str,
    ) -> Result<IndexReport, RepositoryError> {
        let paths = self
            .files
            .list(user_id, campaign)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut report = IndexReport::default();
        for path in &paths {
            let mime = detect_mime(path);
            if !is_text_mime(mime) {
                tracing::debug!(path, mime, "skipping non-text file");
                report.files_skipped += 1;
                continue;
            }

            let content = match self.files.read(user_id, campaign, path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path, error = %e, "skipping unreadable file");
                    report.files_skipped += 1;
                    continue;
                }
            };

            let chunks = self.chunker.chunk(&content, mime);
            report.chunks_written += self
                .index
                .replace_file_chunks(user_id, campaign, path, category_of(path), &chunks)
                .await?;
            report.files_indexed += 1;
        }

        tracing::info!(
            user_id,
            campaign,
            files = report.files_indexed,
            skipped = report.files_skipped,
            chunks = report.chunks_written,
            "campaign indexed"
        );
        Ok(report)
    }
}
