//! Sentence-boundary text chunker.
//!
//! Splits submission text into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on sentence endings (`.`, `!`, `?`
//! followed by whitespace) to preserve coherence within each chunk; this is
//! a heuristic, not full sentence segmentation.
//!
//! Token counts are approximated as whitespace-delimited word counts. A
//! single sentence longer than `max_tokens` is never split; it becomes its
//! own oversized chunk.

use crate::models::Chunk;

/// Split text into sentence-respecting chunks of at most `max_tokens` words.
///
/// Returns chunks with contiguous 1-based indices. Words within a chunk are
/// re-joined with single spaces, so concatenating all chunks reproduces the
/// input's word sequence (whitespace is normalized at split points).
///
/// # Guarantees
///
/// - Empty or whitespace-only input yields an empty Vec.
/// - Every chunk's `token_count` is ≤ `max_tokens`, except a chunk holding
///   exactly one sentence whose own word count exceeds the limit.
/// - Pure and deterministic; no side effects.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for sentence in split_sentences(text) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        if current.len() + words.len() > max_tokens && !current.is_empty() {
            flush_chunk(&mut chunks, &mut current);
        }
        current.extend(words);
    }

    if !current.is_empty() {
        flush_chunk(&mut chunks, &mut current);
    }

    chunks
}

fn flush_chunk(chunks: &mut Vec<Chunk>, words: &mut Vec<&str>) {
    chunks.push(Chunk {
        index: chunks.len() + 1,
        text: words.join(" "),
        token_count: words.len(),
    });
    words.clear();
}

/// Split on `.`, `!`, or `?` followed by whitespace, consuming the
/// whitespace run. The terminator stays attached to its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if matches!(b, b'.' | b'!' | b'?')
            && bytes.get(i + 1).is_some_and(|n| n.is_ascii_whitespace())
        {
            sentences.push(&text[start..=i]);
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("The mitochondria is the powerhouse of the cell.", 250);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 1);
        assert_eq!(chunks[0].token_count, 8);
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_text("", 250).is_empty());
        assert!(chunk_text("   ", 250).is_empty());
        assert!(chunk_text("\n\t\n", 250).is_empty());
    }

    #[test]
    fn test_word_sequence_preserved() {
        let text = "First sentence here. Second one follows!  Third, with\nodd   spacing? Fourth ends it.";
        let chunks = chunk_text(text, 5);
        let chunked_words: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace())
            .collect();
        let original_words: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(chunked_words, original_words);
    }

    #[test]
    fn test_indices_contiguous_one_based() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} is short.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 10);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i + 1);
        }
    }

    #[test]
    fn test_token_bound_respected() {
        let text = (0..30)
            .map(|i| format!("Sentence {} has exactly six words.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 13);
        // Two six-word sentences fit; a third would exceed 13.
        for c in &chunks {
            assert!(c.token_count <= 13, "chunk over limit: {}", c.token_count);
        }
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long_sentence = format!("{} end.", vec!["word"; 30].join(" "));
        let text = format!("Short lead-in. {} Short tail.", long_sentence);
        let chunks = chunk_text(&text, 10);
        // The 31-word sentence must appear intact as its own chunk.
        let oversized: Vec<&Chunk> = chunks.iter().filter(|c| c.token_count > 10).collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].token_count, 31);
        assert!(oversized[0].text.starts_with("word word"));
    }

    #[test]
    fn test_no_terminal_punctuation() {
        let chunks = chunk_text("a trailing fragment without any terminator", 250);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 6);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma. Delta epsilon! Zeta eta theta? Iota kappa.";
        let a = chunk_text(text, 4);
        let b = chunk_text(text, 4);
        assert_eq!(a, b);
    }
}
