//! Service configuration loader for Lorekeeper.
//!
//! Reads `config.toml` from the data directory (`~/.lorekeeper/` in production)
//! and deserializes it into [`ServiceConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use lorekeeper_types::config::ServiceConfig;

/// Load service configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`ServiceConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_service_config(data_dir: &Path) -> ServiceConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ServiceConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ServiceConfig::default();
        }
    };

    match toml::from_str::<ServiceConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ServiceConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// `LOREKEEPER_DATA_DIR` wins, then `~/.lorekeeper`, then `./.lorekeeper`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LOREKEEPER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".lorekeeper");
    }

    PathBuf::from(".lorekeeper")
}

/// A configured storage path; relative paths are taken from the data directory.
pub fn resolve_under(data_dir: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}

/// SQLite URL for the service database inside `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("lorekeeper.db").display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_service_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_service_config(tmp.path()).await;
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.storage.history_ttl_secs, 604_800);
    }

    #[tokio::test]
    async fn load_service_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[models]
planning_model = "planner-x"

[agent]
max_iterations = 5

[auth]
jwks_url = "https://issuer.example/.well-known/jwks.json"
issuer = "https://issuer.example/"
"#,
        )
        .await
        .unwrap();

        let config = load_service_config(tmp.path()).await;
        assert_eq!(config.models.planning_model, "planner-x");
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.planning_max_tokens, 400);
        assert_eq!(config.auth.issuer.as_deref(), Some("https://issuer.example/"));
    }

    #[tokio::test]
    async fn load_service_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_service_config(tmp.path()).await;
        assert_eq!(config.agent.max_iterations, 3);
    }

    #[test]
    fn resolve_under_keeps_absolute_paths() {
        let data_dir = Path::new("/srv/lorekeeper");
        assert_eq!(
            resolve_under(data_dir, "campaigns"),
            PathBuf::from("/srv/lorekeeper/campaigns")
        );
        assert_eq!(
            resolve_under(data_dir, "/mnt/campaigns"),
            PathBuf::from("/mnt/campaigns")
        );
    }

    #[test]
    fn database_url_points_into_data_dir() {
        let url = database_url(Path::new("/srv/lorekeeper"));
        assert!(url.starts_with("sqlite:///srv/lorekeeper/lorekeeper.db"));
    }
}
