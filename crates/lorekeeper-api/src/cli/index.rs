//! `lorekeeper index`: (re)build the search index of one campaign.

use std::path::Path;

use secrecy::SecretString;

use lorekeeper_infra::config::resolve_under;
use lorekeeper_infra::storage::chunker::TextChunker;
use lorekeeper_infra::storage::files::LocalCampaignFiles;
use lorekeeper_infra::storage::indexer::{CampaignIndexer, IndexReport};
use lorekeeper_infra::vector::campaign::LanceCampaignIndex;
use lorekeeper_infra::vector::embedder::BedrockEmbedder;
use lorekeeper_types::config::ServiceConfig;

use crate::state::{endpoint, open_stores};

pub async fn index_campaign(
    config: &ServiceConfig,
    data_dir: &Path,
    token: SecretString,
    user_id: &str,
    campaign: &str,
    json: bool,
) -> anyhow::Result<()> {
    let (_db_pool, vectors) = open_stores(config, data_dir).await?;
    let endpoint = endpoint(config, token)?;

    let files = LocalCampaignFiles::new(resolve_under(data_dir, &config.storage.campaign_files_dir));
    let campaign_dir = files.root().join(user_id).join(campaign);
    if !tokio::fs::try_exists(&campaign_dir).await.unwrap_or(false) {
        anyhow::bail!("campaign directory {} does not exist", campaign_dir.display());
    }

    let chunker = TextChunker::new(config.storage.chunk_size, config.storage.chunk_overlap)?;
    let embedder = BedrockEmbedder::new(endpoint, config.models.embedding_model.clone());
    let indexer = CampaignIndexer::new(files, LanceCampaignIndex::new(vectors, embedder), chunker);

    let report = indexer.index_campaign(user_id, campaign).await?;
    let stored = indexer.index().count(user_id, campaign).await?;
    println!("{}", render_report(user_id, campaign, &report, stored, json));
    Ok(())
}

fn render_report(
    user_id: &str,
    campaign: &str,
    report: &IndexReport,
    stored: usize,
    json: bool,
) -> String {
    if json {
        serde_json::json!({
            "user": user_id,
            "campaign": campaign,
            "files_indexed": report.files_indexed,
            "files_skipped": report.files_skipped,
            "chunks_written": report.chunks_written,
            "chunks_stored": stored,
        })
        .to_string()
    } else {
        format!(
            "  Indexed '{campaign}' for {user_id}: {} files, {} chunks ({} skipped), {stored} chunks stored",
            report.files_indexed, report.chunks_written, report.files_skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> IndexReport {
        IndexReport {
            files_indexed: 3,
            files_skipped: 1,
            chunks_written: 12,
        }
    }

    #[test]
    fn test_render_text_report() {
        assert_eq!(
            render_report("u1", "saltmarsh", &report(), 14, false),
            "  Indexed 'saltmarsh' for u1: 3 files, 12 chunks (1 skipped), 14 chunks stored"
        );
    }

    #[test]
    fn test_render_json_report() {
        let value: serde_json::Value =
            serde_json::from_str(&render_report("u1", "saltmarsh", &report(), 14, true)).unwrap();
        assert_eq!(value["chunks_written"], 12);
        assert_eq!(value["chunks_stored"], 14);
        assert_eq!(value["campaign"], "saltmarsh");
    }

    #[tokio::test]
    async fn test_missing_campaign_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = index_campaign(
            &ServiceConfig::default(),
            dir.path(),
            SecretString::from("t".to_string()),
            "u1",
            "nowhere",
            false,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
