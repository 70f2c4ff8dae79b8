//! Document segmentation into overlapping chunks.
//!
//! Windows of approximately `chunk_size` characters, preferring paragraph,
//! sentence, then word boundaries, with `chunk_overlap` characters repeated
//! between consecutive chunks so no information sits entirely inside a
//! discarded overlap. Offsets are character-based.

use deskbot_shared::{Chunk, CharSpan, DeskbotError, Document, Result};

/// Boundary separators tried in priority order when a window must be cut.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Splits document text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct Segmenter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Segmenter {
    /// Create a segmenter. Rejects `chunk_overlap >= chunk_size` so a
    /// misconfiguration fails before any crawling happens.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DeskbotError::config("chunk_size must be non-zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(DeskbotError::config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split a document into an ordered, contiguous, overlapping cover of
    /// its text. Whitespace-only windows are not emitted.
    pub fn segment(&self, doc: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = doc.raw_text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();

        if total == 0 {
            return chunks;
        }

        let mut start = 0usize;
        let mut sequence_index = 0u32;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end == total {
                total
            } else {
                self.preferred_cut(&chars[start..hard_end])
                    .map(|rel| start + rel)
                    .unwrap_or(hard_end)
            };

            let text: String = chars[start..end].iter().collect();
            if !text.trim().is_empty() {
                chunks.push(Chunk::new(
                    &doc.url,
                    sequence_index,
                    text,
                    CharSpan { start, end },
                ));
                sequence_index += 1;
            }

            if end == total {
                break;
            }
            // Step back by the overlap, but always make forward progress.
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }

    /// Find the best cut point inside a full-size window: the last separator
    /// occurrence in the window's second half, tried in priority order.
    /// Returns the exclusive cut offset relative to the window.
    fn preferred_cut(&self, window: &[char]) -> Option<usize> {
        let floor = self.chunk_size / 2;

        for sep in SEPARATORS {
            let pat: Vec<char> = sep.chars().collect();
            if let Some(pos) = rfind_chars(window, &pat, floor) {
                return Some(pos + pat.len());
            }
        }
        None
    }
}

/// Find the last occurrence of `pat` in `chars` starting at or after `floor`.
fn rfind_chars(chars: &[char], pat: &[char], floor: usize) -> Option<usize> {
    if pat.is_empty() || chars.len() < pat.len() {
        return None;
    }
    let mut i = chars.len() - pat.len();
    loop {
        if i < floor {
            return None;
        }
        if chars[i..i + pat.len()] == *pat {
            return Some(i);
        }
        if i == 0 {
            return None;
        }
        i -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(text: &str) -> Document {
        Document {
            url: "https://example.com/page".into(),
            raw_text: text.into(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_overlap_not_below_size() {
        assert!(Segmenter::new(100, 100).is_err());
        assert!(Segmenter::new(100, 120).is_err());
        assert!(Segmenter::new(100, 99).is_ok());
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let seg = Segmenter::new(800, 120).unwrap();
        let chunks = seg.segment(&doc("Uma página curta."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].char_span, CharSpan { start: 0, end: 17 });
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        // No separators at all, so every cut is a hard cut.
        let text: String = "a".repeat(250);
        let seg = Segmenter::new(100, 20).unwrap();
        let chunks = seg.segment(&doc(&text));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].char_span, CharSpan { start: 0, end: 100 });
        assert_eq!(chunks[1].char_span, CharSpan { start: 80, end: 180 });
        assert_eq!(chunks[2].char_span, CharSpan { start: 160, end: 250 });

        // The tail of each chunk is repeated at the head of the next.
        let tail: String = chunks[0].text.chars().skip(80).collect();
        let head: String = chunks[1].text.chars().take(20).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn chunks_form_contiguous_cover() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(50);
        let seg = Segmenter::new(120, 30).unwrap();
        let chunks = seg.segment(&doc(&text));

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].char_span.start, 0);
        assert_eq!(chunks.last().unwrap().char_span.end, text.chars().count());
        for pair in chunks.windows(2) {
            // Next chunk starts inside the previous one: no gaps.
            assert!(pair[1].char_span.start < pair[0].char_span.end);
            assert!(pair[1].char_span.start > pair[0].char_span.start);
        }
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let text = format!("{}. {}", "x".repeat(70), "y".repeat(100));
        let seg = Segmenter::new(100, 10).unwrap();
        let chunks = seg.segment(&doc(&text));

        // First cut lands just after ". ", not at the hard 100-char limit.
        assert_eq!(chunks[0].char_span.end, 72);
        assert!(chunks[0].text.ends_with(". "));
    }

    #[test]
    fn sequence_indexes_are_dense_and_ordered() {
        let text = "palavra ".repeat(400);
        let seg = Segmenter::new(200, 40).unwrap();
        let chunks = seg.segment(&doc(&text));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index as usize, i);
        }
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let seg = Segmenter::new(100, 10).unwrap();
        assert!(seg.segment(&doc("")).is_empty());
        assert!(seg.segment(&doc("   \n  \n ")).is_empty());
    }
}
