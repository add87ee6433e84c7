//! Token-window chunking for flattened repository documents.
//!
//! Documents are split on cl100k token boundaries into fixed-size windows that
//! overlap by a configurable number of tokens, so a definition cut at a window
//! edge still appears whole in one of the neighbours.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tiktoken_rs::{cl100k_base, CoreBPE};

static TOKENIZER: OnceCell<CoreBPE> = OnceCell::new();

fn tokenizer() -> Result<&'static CoreBPE> {
    TOKENIZER.get_or_try_init(cl100k_base)
}

/// A window of a document, ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub tokens: usize,
    pub chunk_order_index: usize,
}

pub fn count_tokens(text: &str) -> Result<usize> {
    Ok(tokenizer()?.encode_ordinary(text).len())
}

/// Cut `text` down to at most `max_tokens` tokens.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> Result<String> {
    let bpe = tokenizer()?;
    let tokens = bpe.encode_ordinary(text);
    if tokens.len() <= max_tokens {
        return Ok(text.to_string());
    }
    Ok(decode_window(bpe, &tokens[..max_tokens]))
}

/// Split `text` into windows of `max_tokens` tokens, each starting
/// `max_tokens - overlap_tokens` tokens after the previous one.
pub fn chunk_by_tokens(
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<TextChunk>> {
    if max_tokens == 0 {
        anyhow::bail!("Chunk size must be positive");
    }
    if overlap_tokens >= max_tokens {
        anyhow::bail!(
            "Chunk overlap ({overlap_tokens}) must be smaller than chunk size ({max_tokens})"
        );
    }

    let bpe = tokenizer()?;
    let tokens = bpe.encode_ordinary(text);
    let step = max_tokens - overlap_tokens;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < tokens.len() {
        let end = (start + max_tokens).min(tokens.len());
        let window = &tokens[start..end];
        let content = decode_window(bpe, window).trim().to_string();
        if !content.is_empty() {
            chunks.push(TextChunk {
                content,
                tokens: window.len(),
                chunk_order_index: chunks.len(),
            });
        }
        if end == tokens.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Decode a token window. A window edge can fall inside a multi-byte
/// character; up to three byte tokens are dropped from either edge until the
/// window decodes as UTF-8.
fn decode_window(bpe: &CoreBPE, window: &[usize]) -> String {
    for trim_start in 0..4 {
        for trim_end in 0..4 {
            if trim_start + trim_end >= window.len() {
                break;
            }
            let slice = &window[trim_start..window.len() - trim_end];
            if let Ok(text) = bpe.decode(slice.to_vec()) {
                return text;
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_empty_text() {
        let chunks = chunk_by_tokens("", 100, 10).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_by_tokens("fn main() { println!(\"hi\"); }", 100, 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_order_index, 0);
        assert!(chunks[0].content.contains("fn main()"));
    }

    #[test]
    fn test_windows_respect_size_and_order() {
        let text: String = (0..400).map(|i| format!("word{i} ")).collect();
        let chunks = chunk_by_tokens(&text, 50, 10).unwrap();
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_order_index, i);
            assert!(chunk.tokens <= 50);
        }
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let text: String = (0..200).map(|i| format!("token{i} ")).collect();
        let chunks = chunk_by_tokens(&text, 40, 15).unwrap();
        assert!(chunks.len() >= 2);
        // The last whole word of the first window reappears in the second
        let first_words: Vec<&str> = chunks[0].content.split_whitespace().collect();
        let tail_word = first_words[first_words.len() - 2];
        assert!(chunks[1].content.contains(tail_word));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(chunk_by_tokens("abc", 10, 10).is_err());
        assert!(chunk_by_tokens("abc", 0, 0).is_err());
    }

    #[test]
    fn test_multibyte_text_survives_chunking() {
        let text = "日本語のテキストと絵文字 🌍🚀 が混在する文書。".repeat(40);
        let chunks = chunk_by_tokens(&text, 32, 4).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.content.is_empty());
        }
    }

    #[test]
    fn test_every_character_lands_in_some_window() {
        let text: String = (0..200u32)
            .filter_map(|i| char::from_u32(0x4E00 + i * 7))
            .collect();
        let chunks = chunk_by_tokens(&text, 16, 4).unwrap();
        let covered: std::collections::HashSet<char> =
            chunks.iter().flat_map(|c| c.content.chars()).collect();
        let missing: Vec<char> = text.chars().filter(|c| !covered.contains(c)).collect();
        assert!(missing.is_empty(), "lost characters: {missing:?}");
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_to_tokens("hello world", 100).unwrap(), "hello world");
    }

    #[test]
    fn test_truncate_long_text() {
        let text = "alpha beta gamma delta ".repeat(100);
        let truncated = truncate_to_tokens(&text, 20).unwrap();
        assert!(count_tokens(&truncated).unwrap() <= 20);
        assert!(text.starts_with(&truncated));
    }
}
