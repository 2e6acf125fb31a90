//! Word-window chunking for raw product text and search passages.

/// Window and overlap sizes, in whitespace-separated words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub target_words: usize,
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_words: 256,
            overlap_words: 48,
        }
    }
}

/// Split `text` into overlapping windows. Empty input yields no chunks.
pub fn chunk_text(text: &str, config: ChunkConfig) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let target = config.target_words.max(1);
    let overlap = config.overlap_words.min(target - 1);
    let stride = target - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + target).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += stride;
    }
    chunks
}
