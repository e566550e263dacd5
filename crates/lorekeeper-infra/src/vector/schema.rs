//! Arrow schema for the campaign chunk table in LanceDB.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Output dimension of the Cohere English v3 embedding model.
pub const EMBEDDING_DIMENSION: i32 = 1024;

/// Name of the single table holding every user's campaign chunks.
pub const CAMPAIGN_CHUNKS_TABLE: &str = "campaign_chunks";

/// Schema for the campaign chunk table.
///
/// Rows are partitioned logically by `user_id` and `campaign`; every search
/// filters on both. `category` is the first directory of `file_path` and is
/// null for files at the campaign root.
pub fn campaign_chunks_schema() -> Schema {
    Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("campaign", DataType::Utf8, false),
        Field::new("file_path", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, true),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("chunk_text", DataType::Utf8, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                EMBEDDING_DIMENSION,
            ),
            false,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_chunks_schema_fields() {
        let schema = campaign_chunks_schema();
        assert_eq!(schema.fields().len(), 9);
        for name in ["user_id", "campaign", "file_path", "chunk_text"] {
            assert!(!schema.field_with_name(name).unwrap().is_nullable(), "{name}");
        }
        assert!(schema.field_with_name("category").unwrap().is_nullable());

        let vector_field = schema.field_with_name("vector").unwrap();
        match vector_field.data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, EMBEDDING_DIMENSION),
            other => panic!("Expected FixedSizeList, got {:?}", other),
        }
    }
}
