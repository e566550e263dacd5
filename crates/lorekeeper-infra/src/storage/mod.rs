//! Campaign file storage and indexing.
//!
//! Implements the `CampaignFileStore` trait from `lorekeeper-core` over a
//! local directory tree, plus the chunk-and-embed pipeline that feeds the
//! vector index.

use std::path::Path;

pub mod chunker;
pub mod files;
pub mod indexer;

/// Detect MIME type from file extension.
///
/// Only the distinction between indexable text and everything else matters
/// to callers, so binary formats collapse to `application/octet-stream`.
pub fn detect_mime(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "yaml" | "yml" => "text/yaml",
        "toml" => "text/toml",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Check whether a MIME type represents indexable text content.
pub fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/") || mime == "application/json"
}
