//! Local filesystem campaign store.
//!
//! Campaign files live at `{root}/{user_id}/{campaign}/{relative_path}`.
//! Every read resolves symlinks and re-checks that the final path is still
//! inside the campaign directory.

use std::path::{Path, PathBuf};

use lorekeeper_core::tools::files::CampaignFileStore;
use lorekeeper_types::error::ToolError;

/// Filesystem-backed implementation of `CampaignFileStore`.
pub struct LocalCampaignFiles {
    root: PathBuf,
}

impl LocalCampaignFiles {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn campaign_dir(&self, user_id: &str, campaign: &str) -> Result<PathBuf, ToolError> {
        Ok(self
            .root
            .join(scope_segment(user_id)?)
            .join(scope_segment(campaign)?))
    }
}

/// A user id or campaign name must be one plain path component.
fn scope_segment(value: &str) -> Result<&str, ToolError> {
    let plain = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0']);
    if plain {
        Ok(value)
    } else {
        Err(ToolError::PathEscape(value.to_string()))
    }
}

fn not_found(relative_path: &str) -> ToolError {
    ToolError::NotFound(relative_path.to_string())
}

impl CampaignFileStore for LocalCampaignFiles {
    async fn read(
        &self,
        user_id: &str,
        campaign: &str,
        relative_path: &str,
    ) -> Result<String, ToolError> {
        let campaign_dir = self.campaign_dir(user_id, campaign)?;
        let scope = tokio::fs::canonicalize(&campaign_dir)
            .await
            .map_err(|_| not_found(relative_path))?;
        let target = tokio::fs::canonicalize(campaign_dir.join(relative_path))
            .await
            .map_err(|_| not_found(relative_path))?;

        if !target.starts_with(&scope) {
            tracing::warn!(user_id, campaign, relative_path, "file read escaped campaign scope");
            return Err(ToolError::PathEscape(relative_path.to_string()));
        }
        if !target.is_file() {
            return Err(not_found(relative_path));
        }

        let bytes = tokio::fs::read(&target)
            .await
            .map_err(|e| ToolError::Upstream(format!("failed to read '{relative_path}': {e}")))?;
        String::from_utf8(bytes).map_err(|_| ToolError::InvalidArguments {
            tool: "get_file_content".to_string(),
            reason: format!("'{relative_path}' is not a text file"),
        })
    }

    async fn list(&self, user_id: &str, campaign: &str) -> Result<Vec<String>, ToolError> {
        let campaign_dir = self.campaign_dir(user_id, campaign)?;
        if !campaign_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut pending = vec![campaign_dir.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| ToolError::Upstream(format!("failed to list '{}': {e}", dir.display())))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| ToolError::Upstream(e.to_string()))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| ToolError::Upstream(e.to_string()))?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let Ok(relative) = path.strip_prefix(&campaign_dir) else {
                        continue;
                    };
                    let parts: Vec<_> = relative
                        .components()
                        .filter_map(|c| c.as_os_str().to_str())
                        .collect();
                    files.push(parts.join("/"));
                }
                // Symlinks are not listed.
            }
        }

        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (tempfile::TempDir, LocalCampaignFiles) {
        let dir = tempfile::tempdir().unwrap();
        let campaign = dir.path().join("u1").join("saltmarsh");
        tokio::fs::create_dir_all(campaign.join("npcs")).await.unwrap();
        tokio::fs::write(campaign.join("overview.md"), "# Saltmarsh").await.unwrap();
        tokio::fs::write(campaign.join("npcs").join("mira.md"), "Mira, innkeeper.")
            .await
            .unwrap();

        let other = dir.path().join("u2").join("saltmarsh");
        tokio::fs::create_dir_all(&other).await.unwrap();
        tokio::fs::write(other.join("secret.md"), "not yours").await.unwrap();

        let store = LocalCampaignFiles::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[tokio::test]
    async fn test_read_file_in_scope() {
        let (_dir, store) = fixture().await;
        let content = store.read("u1", "saltmarsh", "npcs/mira.md").await.unwrap();
        assert_eq!(content, "Mira, innkeeper.");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_dir, store) = fixture().await;
        let err = store.read("u1", "saltmarsh", "npcs/nobody.md").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));

        let err = store.read("u1", "missing-campaign", "overview.md").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let (_dir, store) = fixture().await;
        let err = store.read("u1", "saltmarsh", "npcs").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_into_other_user_rejected() {
        let (_dir, store) = fixture().await;
        let err = store
            .read("u1", "saltmarsh", "../../u2/saltmarsh/secret.md")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PathEscape(_)));
    }

    #[tokio::test]
    async fn test_bad_scope_segments_rejected() {
        let (_dir, store) = fixture().await;
        for (user, campaign) in [("..", "saltmarsh"), ("u1", "../u2"), ("", "saltmarsh")] {
            let err = store.read(user, campaign, "overview.md").await.unwrap_err();
            assert!(matches!(err, ToolError::PathEscape(_)), "{user}/{campaign}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let (dir, store) = fixture().await;
        std::os::unix::fs::symlink(
            dir.path().join("u2").join("saltmarsh").join("secret.md"),
            dir.path().join("u1").join("saltmarsh").join("link.md"),
        )
        .unwrap();

        let err = store.read("u1", "saltmarsh", "link.md").await.unwrap_err();
        assert!(matches!(err, ToolError::PathEscape(_)));
        assert!(!store.list("u1", "saltmarsh").await.unwrap().contains(&"link.md".to_string()));
    }

    #[tokio::test]
    async fn test_list_walks_tree_sorted() {
        let (_dir, store) = fixture().await;
        let files = store.list("u1", "saltmarsh").await.unwrap();
        assert_eq!(files, vec!["npcs/mira.md".to_string(), "overview.md".to_string()]);
    }

    #[tokio::test]
    async fn test_list_missing_campaign_is_empty() {
        let (_dir, store) = fixture().await;
        assert!(store.list("u3", "nowhere").await.unwrap().is_empty());
    }
}
