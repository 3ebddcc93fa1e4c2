//! Splits page-indexed manual text into bounded chunks for extraction.
//!
//! Chunk boundaries prefer page edges, then blank lines inside an oversized
//! page, and only then a hard character cut. Chunks partition the
//! concatenated page text exactly: joining chunk texts in order reproduces
//! the input (the round-trip invariant the tests lean on).

use std::collections::BTreeMap;

use crate::commandset::ManualChunk;
use crate::core::PipelineError;

/// Lazy, finite, ordered producer of [`ManualChunk`]s.
pub struct Chunker {
    segments: std::vec::IntoIter<(u32, String)>,
    pending: Option<(u32, String)>,
    budget: usize,
    index: usize,
    offset: usize,
}

impl Chunker {
    /// Build a chunker over page text with a maximum characters-per-chunk
    /// budget. A zero budget or an empty page set is a configuration error.
    pub fn new(pages: &BTreeMap<u32, String>, budget: usize) -> Result<Self, PipelineError> {
        if budget == 0 {
            return Err(PipelineError::Configuration(
                "chunk budget must be positive".to_string(),
            ));
        }
        if pages.is_empty() {
            return Err(PipelineError::Configuration(
                "empty page range: nothing to chunk".to_string(),
            ));
        }

        // Pre-split any page that exceeds the budget on its own; every
        // resulting segment fits a chunk. Empty pages contribute nothing.
        let mut segments = Vec::new();
        for (&page, text) in pages {
            if text.is_empty() {
                continue;
            }
            if text.len() <= budget {
                segments.push((page, text.clone()));
            } else {
                for piece in split_page(text, budget) {
                    segments.push((page, piece.to_string()));
                }
            }
        }

        Ok(Self {
            segments: segments.into_iter(),
            pending: None,
            budget,
            index: 0,
            offset: 0,
        })
    }
}

impl Iterator for Chunker {
    type Item = ManualChunk;

    fn next(&mut self) -> Option<ManualChunk> {
        let mut pages: Vec<u32> = Vec::new();
        let mut text = String::new();

        loop {
            let (page, segment) = match self.pending.take().or_else(|| self.segments.next()) {
                Some(s) => s,
                None => break,
            };
            if !text.is_empty() && text.len() + segment.len() > self.budget {
                self.pending = Some((page, segment));
                break;
            }
            if pages.last() != Some(&page) {
                pages.push(page);
            }
            text.push_str(&segment);
        }

        if text.is_empty() {
            return None;
        }

        let span = self.offset..self.offset + text.len();
        let chunk = ManualChunk {
            index: self.index,
            start_page: pages[0],
            pages,
            span,
            text,
        };
        self.index += 1;
        self.offset = chunk.span.end;
        Some(chunk)
    }
}

/// Cut one oversized page into budget-sized pieces, preferring the last blank
/// line inside each window over a raw character cut.
fn split_page(text: &str, budget: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.len() > budget {
        let window = char_floor(rest, budget);
        let mut cut = window;
        if let Some(pos) = rest[..window].rfind("\n\n") {
            if pos > 0 {
                cut = pos + 2;
            }
        }
        if cut == 0 {
            // Budget smaller than a single character; take that character whole.
            cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        pieces.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Largest char boundary at or below `i`.
fn char_floor(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages_from(entries: &[(u32, &str)]) -> BTreeMap<u32, String> {
        entries
            .iter()
            .map(|&(p, t)| (p, t.to_string()))
            .collect()
    }

    #[test]
    fn zero_budget_is_configuration_error() {
        let pages = pages_from(&[(1, "text")]);
        assert!(matches!(
            Chunker::new(&pages, 0),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn empty_pages_is_configuration_error() {
        let pages = BTreeMap::new();
        assert!(matches!(
            Chunker::new(&pages, 100),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn single_small_page_is_one_chunk() {
        let pages = pages_from(&[(7, "VOLT <value>\n")]);
        let chunks: Vec<_> = Chunker::new(&pages, 100).expect("chunker").collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_page, 7);
        assert_eq!(chunks[0].pages, vec![7]);
        assert_eq!(chunks[0].span, 0..13);
    }

    #[test]
    fn split_prefers_blank_lines() {
        let text = "alpha\n\nbeta\n\ngamma";
        let pieces = split_page(text, 10);
        assert_eq!(pieces.concat(), text);
        // First cut should land on the blank line after "alpha".
        assert_eq!(pieces[0], "alpha\n\n");
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "μμμμμμμμ"; // 2 bytes per char
        let pieces = split_page(text, 5);
        assert_eq!(pieces.concat(), text);
        for piece in pieces {
            assert!(piece.len() <= 5);
        }
    }

    #[test]
    fn chunk_indexes_are_sequential() {
        let pages = pages_from(&[(1, "aaaa"), (2, "bbbb"), (3, "cccc")]);
        let chunks: Vec<_> = Chunker::new(&pages, 4).expect("chunker").collect();
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }
}
