//! Semantic text chunker for campaign files.
//!
//! Markdown files are split with `MarkdownSplitter` so chunks follow heading
//! and paragraph structure; all other text uses `TextSplitter`. Chunk size
//! and overlap are measured in characters.

use text_splitter::{Characters, ChunkConfig, ChunkConfigError, MarkdownSplitter, TextSplitter};

/// Splits file content into overlapping chunks ready for embedding.
pub struct TextChunker {
    markdown: MarkdownSplitter<Characters>,
    plain: TextSplitter<Characters>,
}

impl TextChunker {
    /// Build a chunker. Fails when `overlap` is not smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkConfigError> {
        let config = || ChunkConfig::new(chunk_size).with_overlap(overlap);
        Ok(Self {
            markdown: MarkdownSplitter::new(config()?),
            plain: TextSplitter::new(config()?),
        })
    }

    /// Chunk `content`; `mime` decides which splitter applies.
    ///
    /// Whitespace-only chunks are dropped.
    pub fn chunk(&self, content: &str, mime: &str) -> Vec<String> {
        let chunks: Vec<&str> = if mime == "text/markdown" {
            self.markdown.chunks(content).collect()
        } else {
            self.plain.chunks(content).collect()
        };

        chunks
            .into_iter()
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(str::to_string)
            .collect()
    }
}
