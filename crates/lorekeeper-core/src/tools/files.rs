//! Scoped read access to campaign files.
//!
//! Files live under `{user_id}/{campaign}/`; paths handed to the store are
//! relative to that root and must not escape it.

use std::path::{Component, Path};

use lorekeeper_types::error::ToolError;

/// Read/list port for one user's campaign files.
///
/// Implementations live in lorekeeper-infra (e.g., `LocalCampaignFiles`).
pub trait CampaignFileStore: Send + Sync {
    /// Full content of one file. `relative_path` has already passed
    /// [`normalize_campaign_path`].
    fn read(
        &self,
        user_id: &str,
        campaign: &str,
        relative_path: &str,
    ) -> impl std::future::Future<Output = Result<String, ToolError>> + Send;

    /// Every file under the campaign root, as relative paths.
    fn list(
        &self,
        user_id: &str,
        campaign: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, ToolError>> + Send;
}

impl<T: CampaignFileStore> CampaignFileStore for std::sync::Arc<T> {
    async fn read(
        &self,
        user_id: &str,
        campaign: &str,
        relative_path: &str,
    ) -> Result<String, ToolError> {
        self.as_ref().read(user_id, campaign, relative_path).await
    }

    async fn list(&self, user_id: &str, campaign: &str) -> Result<Vec<String>, ToolError> {
        self.as_ref().list(user_id, campaign).await
    }
}

/// Validate a model-supplied path and return it in canonical relative form.
///
/// Rejects absolute paths and any `..` component. A leading
/// `{user_id}/{campaign}/` prefix (as it appears in full storage keys) is
/// stripped so either form resolves to the same file.
pub fn normalize_campaign_path(
    user_id: &str,
    campaign: &str,
    raw: &str,
) -> Result<String, ToolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidArguments {
            tool: "get_file_content".to_string(),
            reason: "file_path is empty".to_string(),
        });
    }

    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => return Err(ToolError::PathEscape(raw.to_string())),
            },
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ToolError::PathEscape(raw.to_string()));
            }
        }
    }

    if parts.len() > 2 && parts[0] == user_id && parts[1] == campaign {
        parts.drain(..2);
    }
    if parts.is_empty() {
        return Err(ToolError::PathEscape(raw.to_string()));
    }
    Ok(parts.join("/"))
}

/// Category of a campaign file: its first directory, if any.
pub fn category_of(relative_path: &str) -> Option<&str> {
    relative_path
        .split_once('/')
        .map(|(first, _)| first)
        .filter(|first| !first.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_pass_through() {
        assert_eq!(
            normalize_campaign_path("u1", "c", "npcs/mira.md").unwrap(),
            "npcs/mira.md"
        );
        assert_eq!(
            normalize_campaign_path("u1", "c", "./lore/./gods.md").unwrap(),
            "lore/gods.md"
        );
    }

    #[test]
    fn full_storage_key_prefix_is_stripped() {
        assert_eq!(
            normalize_campaign_path("u1", "c", "u1/c/npcs/mira.md").unwrap(),
            "npcs/mira.md"
        );
    }

    #[test]
    fn traversal_and_absolute_paths_rejected() {
        for bad in ["../u2/c/secret.md", "npcs/../../x", "/etc/passwd", "."] {
            assert!(
                matches!(
                    normalize_campaign_path("u1", "c", bad),
                    Err(ToolError::PathEscape(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn empty_path_is_invalid_argument() {
        assert!(matches!(
            normalize_campaign_path("u1", "c", "  "),
            Err(ToolError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn category_is_first_directory() {
        assert_eq!(category_of("npcs/mira.md"), Some("npcs"));
        assert_eq!(category_of("overview.md"), None);
    }
}
