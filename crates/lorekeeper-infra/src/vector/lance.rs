//! LanceDB connection wrapper.
//!
//! `LanceVectorStore` owns a `lancedb::Connection` rooted at a directory and
//! offers the table lifecycle helpers the campaign index needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_schema::Schema;

/// LanceDB vector store rooted at a filesystem path.
pub struct LanceVectorStore {
    db: lancedb::Connection,
    base_path: PathBuf,
}

impl LanceVectorStore {
    /// Open or create a LanceDB vector store at the given path.
    ///
    /// Creates the directory if it does not exist.
    pub async fn new(base_path: PathBuf) -> Result<Self, lancedb::Error> {
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|e| lancedb::Error::CreateDir {
                path: base_path.display().to_string(),
                source: e,
            })?;

        let uri = base_path
            .to_str()
            .ok_or_else(|| lancedb::Error::InvalidInput {
                message: format!("Path contains invalid UTF-8: {}", base_path.display()),
            })?;

        let db = lancedb::connect(uri).execute().await?;
        tracing::debug!(path = %base_path.display(), "vector store opened");

        Ok(Self { db, base_path })
    }

    /// Open the table if it exists, otherwise create it empty with `schema`.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<lancedb::Table, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                self.db
                    .create_empty_table(table_name, schema)
                    .execute()
                    .await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn table_exists(&self, table_name: &str) -> bool {
        self.db.open_table(table_name).execute().await.is_ok()
    }

    pub async fn table_names(&self) -> Result<Vec<String>, lancedb::Error> {
        self.db.table_names().execute().await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::schema::{CAMPAIGN_CHUNKS_TABLE, campaign_chunks_schema};

    #[tokio::test]
    async fn test_new_creates_directory_and_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("vectors");
        let store = LanceVectorStore::new(path.clone()).await.unwrap();

        assert!(path.is_dir());
        assert_eq!(store.base_path(), path.as_path());
        assert!(store.table_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_table_creates_then_reopens() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LanceVectorStore::new(temp_dir.path().to_path_buf())
            .await
            .unwrap();
        let schema = Arc::new(campaign_chunks_schema());

        assert!(!store.table_exists(CAMPAIGN_CHUNKS_TABLE).await);
        let table = store
            .ensure_table(CAMPAIGN_CHUNKS_TABLE, schema.clone())
            .await
            .unwrap();
        assert_eq!(table.count_rows(None).await.unwrap(), 0);

        store.ensure_table(CAMPAIGN_CHUNKS_TABLE, schema).await.unwrap();
        assert!(store.table_exists(CAMPAIGN_CHUNKS_TABLE).await);
        assert_eq!(store.table_names().await.unwrap(), vec![CAMPAIGN_CHUNKS_TABLE]);
    }
}
