// src/kb/chunker.rs
// Fixed-window chunker with sentence/word boundary snapping (design doc
// §4.2 step 5). Windows are expressed in tokens but sliced in characters
// using the same chars-per-token ratio the rest of core uses for budget
// decisions (utils::hash::estimate_tokens), so a chunk's reported
// `token_count` always agrees with how it was cut.

use crate::utils::hash::estimate_tokens;

const CHARS_PER_TOKEN: usize = 4;
const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

pub struct ChunkDraft {
    pub order_index: i32,
    pub text: String,
    pub token_count: i64,
}

/// Search backward from `edge` for a sentence terminator, but only accept
/// one within `max_back_chars` of the edge (the "20% of the window edge"
/// rule) so we don't wander arbitrarily far from the target window size.
fn snap_to_sentence_end(text: &str, edge: usize, max_back_chars: usize) -> Option<usize> {
    let lower = edge.saturating_sub(max_back_chars);
    let slice = &text[lower.min(text.len())..edge.min(text.len())];
    let mut best = None;
    for (i, ch) in slice.char_indices() {
        if SENTENCE_TERMINATORS.contains(&ch) {
            best = Some(lower + i + ch.len_utf8());
        }
    }
    best
}

fn snap_to_word_boundary(text: &str, edge: usize) -> usize {
    if edge >= text.len() {
        return text.len();
    }
    match text[..edge].rfind(char::is_whitespace) {
        Some(i) => i,
        None => edge,
    }
}

/// Split `text` into overlapping chunks of `chunk_size_tokens` with
/// `overlap_tokens` of trailing overlap carried into the next chunk.
/// Deterministic: chunking the same text with the same config twice
/// yields identical chunk texts and count (design doc §8 round-trip law).
pub fn chunk_text(text: &str, chunk_size_tokens: usize, overlap_tokens: usize) -> Vec<ChunkDraft> {
    if text.is_empty() {
        return vec![];
    }

    let window_chars = (chunk_size_tokens * CHARS_PER_TOKEN).max(1);
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(window_chars.saturating_sub(1));
    let edge_tolerance = (window_chars as f64 * 0.2) as usize;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut order_index = 0i32;

    while start < text.len() {
        let naive_end = (start + window_chars).min(text.len());
        let mut end = naive_end;

        if end < text.len() {
            if let Some(snapped) = snap_to_sentence_end(text, naive_end, edge_tolerance) {
                end = snapped;
            } else {
                end = snap_to_word_boundary(text, naive_end).max(start + 1);
            }
        }
        // find_char_boundary: never split inside a UTF-8 code point
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        while start < text.len() && !text.is_char_boundary(start) {
            start += 1;
        }

        let slice = text[start..end].trim();
        if !slice.is_empty() {
            chunks.push(ChunkDraft {
                order_index,
                text: slice.to_string(),
                token_count: estimate_tokens(slice),
            });
            order_index += 1;
        }

        if end >= text.len() {
            break;
        }
        start = end.saturating_sub(overlap_chars).max(start + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 500, 50).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("a short document about solar batteries.", 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].order_index, 0);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Sentence one is here. Sentence two follows next. ".repeat(50);
        let a = chunk_text(&text, 50, 10);
        let b = chunk_text(&text, 50, 10);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
        }
    }

    #[test]
    fn long_text_produces_multiple_chunks_within_budget() {
        let text = "The battery state of charge is important. ".repeat(200);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 60, "chunk exceeded window + tolerance: {}", chunk.token_count);
        }
    }

    #[test]
    fn chunk_order_indices_are_sequential() {
        let text = "Word ".repeat(1000);
        let chunks = chunk_text(&text, 50, 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.order_index, i as i32);
        }
    }
}
