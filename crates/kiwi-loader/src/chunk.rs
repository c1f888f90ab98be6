//! Token-bounded chunking (§4.2) using the `o200k_base` tokenizer, the same
//! encoding OpenAI's newer chat/embedding models use.

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

use crate::error::{LoaderError, Result};

static ENCODER: Lazy<CoreBPE> =
    Lazy::new(|| tiktoken_rs::o200k_base().expect("o200k_base ranks are bundled with tiktoken-rs"));

/// One chunk of decoded text paired with its exact token count.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub token_count: i64,
}

/// Splits `text` into chunks of at most `max_tokens` tokens each, in order.
/// An empty or whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_tokens: usize) -> Result<Vec<Chunk>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    if max_tokens == 0 {
        return Err(LoaderError::Decode("max_tokens must be nonzero".into()));
    }

    let tokens = ENCODER.encode_ordinary(text);
    let mut chunks = Vec::with_capacity(tokens.len() / max_tokens + 1);
    for window in tokens.chunks(max_tokens) {
        let decoded = ENCODER
            .decode(window.to_vec())
            .map_err(|e| LoaderError::Decode(format!("token decode failed: {e}")))?;
        chunks.push(Chunk {
            text: decoded,
            token_count: window.len() as i64,
        });
    }
    Ok(chunks)
}

/// Token count for a standalone string, used to populate `ProjectFile.token_count`.
pub fn count_tokens(text: &str) -> i64 {
    ENCODER.encode_ordinary(text).len() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("   \n", 500).unwrap().is_empty());
    }

    #[test]
    fn single_chunk_when_under_limit() {
        let chunks = chunk_text("hello world, this is a short document.", 500).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].token_count <= 500);
    }

    #[test]
    fn splits_long_text_into_bounded_chunks() {
        let text = "the quick brown fox jumps over the lazy dog. ".repeat(200);
        let chunks = chunk_text(&text, 50).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.token_count <= 50);
            assert!(c.token_count > 0);
        }
    }

    #[test]
    fn reassembled_chunks_preserve_content() {
        let text = "alpha beta gamma delta epsilon zeta eta theta.";
        let chunks = chunk_text(text, 3).unwrap();
        let reassembled: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(reassembled, text);
    }

    #[test]
    fn rejects_zero_max_tokens() {
        assert!(chunk_text("anything", 0).is_err());
    }
}
