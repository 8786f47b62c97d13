//! Context-preserving text chunking
//!
//! Splits normalized article text into segments bounded by `max_chunk_size`
//! characters. Paragraphs are packed greedily; when a chunk is flushed, the
//! next one is seeded with a sentence- or word-aligned suffix of it so that
//! context carries across boundaries. Oversized paragraphs fall back to
//! sentence, then word, then character granularity.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Diversity below this ratio (unique words / words) marks a chunk degenerate
const MIN_VOCABULARY_DIVERSITY: f32 = 0.1;

/// Degenerate-chunk detection needs at least this many words to be meaningful
const DIVERSITY_MIN_WORDS: usize = 10;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Chunking parameters (sizes in characters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub max_chunk_size: usize,
    pub min_chunk_size: usize,
    pub overlap_size: usize,
    /// Seed each chunk with the tail of its predecessor
    pub preserve_context: bool,
    /// Word floor for the sole chunk of a short article
    pub min_short_article_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            min_chunk_size: 100,
            overlap_size: 100,
            preserve_context: true,
            min_short_article_words: 3,
        }
    }
}

/// A problem found by [`Chunker::validate`]; never blocks ingestion
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkIssue {
    TooLarge { index: usize, len: usize, max: usize },
    TooSmall { index: usize, len: usize, min: usize },
    Degenerate { index: usize, diversity: f32 },
}

/// A unit of text with the separator that joins it to what precedes it
#[derive(Debug, Clone, Copy)]
struct Piece<'a> {
    text: &'a str,
    separator: &'static str,
}

/// Deterministic chunker
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split normalized text into ordered chunk texts
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let chunks = if char_len(text) <= self.config.max_chunk_size {
            vec![text.to_string()]
        } else {
            self.pack(&self.pieces(text))
        };

        self.apply_size_floor(chunks)
    }

    /// Check chunks against the size bounds and for degenerate vocabulary
    pub fn validate(&self, chunks: &[String]) -> Vec<ChunkIssue> {
        let exempt = chunks.len() == 1;
        let mut issues = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let len = char_len(chunk);
            if len > self.config.max_chunk_size {
                issues.push(ChunkIssue::TooLarge {
                    index,
                    len,
                    max: self.config.max_chunk_size,
                });
            }
            if !exempt && len < self.config.min_chunk_size {
                issues.push(ChunkIssue::TooSmall {
                    index,
                    len,
                    min: self.config.min_chunk_size,
                });
            }
            if let Some(diversity) = vocabulary_diversity(chunk) {
                if diversity < MIN_VOCABULARY_DIVERSITY {
                    issues.push(ChunkIssue::Degenerate { index, diversity });
                }
            }
        }

        issues
    }

    /// Tail of `chunk` used to seed the following chunk
    ///
    /// At most `overlap_size` characters (and never more than half the chunk),
    /// starting at the first sentence boundary inside that window, or failing
    /// that at the first word boundary.
    pub fn overlap_suffix(&self, chunk: &str) -> String {
        let total = char_len(chunk);
        let width = self.config.overlap_size.min(total / 2);
        if width == 0 {
            return String::new();
        }

        let start = byte_offset(chunk, total - width);
        let window = &chunk[start..];

        if let Some(offset) = first_sentence_start(window) {
            return window[offset..].trim().to_string();
        }

        let at_word_boundary = start == 0
            || chunk[..start]
                .chars()
                .next_back()
                .map_or(true, char::is_whitespace);
        if at_word_boundary {
            return window.trim().to_string();
        }

        match window.find(char::is_whitespace) {
            Some(pos) => window[pos..].trim().to_string(),
            None => String::new(),
        }
    }

    /// Flatten text into pieces no larger than `max_chunk_size`
    fn pieces<'a>(&self, text: &'a str) -> Vec<Piece<'a>> {
        let max = self.config.max_chunk_size;
        let mut pieces = Vec::new();

        for paragraph in split_paragraphs(text) {
            if char_len(paragraph) <= max {
                pieces.push(Piece {
                    text: paragraph,
                    separator: PARAGRAPH_SEPARATOR,
                });
                continue;
            }

            for (s_idx, sentence) in split_sentences(paragraph).into_iter().enumerate() {
                let separator = if s_idx == 0 { PARAGRAPH_SEPARATOR } else { " " };
                if char_len(sentence) <= max {
                    pieces.push(Piece {
                        text: sentence,
                        separator,
                    });
                    continue;
                }

                for (w_idx, word) in sentence.split_whitespace().enumerate() {
                    let separator = if w_idx == 0 { separator } else { " " };
                    if char_len(word) <= max {
                        pieces.push(Piece {
                            text: word,
                            separator,
                        });
                        continue;
                    }
                    for (c_idx, slice) in split_chars(word, max).into_iter().enumerate() {
                        pieces.push(Piece {
                            text: slice,
                            separator: if c_idx == 0 { separator } else { "" },
                        });
                    }
                }
            }
        }

        pieces
    }

    /// Greedy accumulate/flush/overlap over bounded pieces
    fn pack(&self, pieces: &[Piece<'_>]) -> Vec<String> {
        let max = self.config.max_chunk_size;
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_len = 0usize;

        for piece in pieces {
            let piece_len = char_len(piece.text);
            let sep_len = char_len(piece.separator);

            if buffer.is_empty() || buffer_len + sep_len + piece_len <= max {
                if !buffer.is_empty() {
                    buffer.push_str(piece.separator);
                    buffer_len += sep_len;
                }
                buffer.push_str(piece.text);
                buffer_len += piece_len;
                continue;
            }

            let seed = if self.config.preserve_context {
                self.overlap_suffix(&buffer)
            } else {
                String::new()
            };
            chunks.push(std::mem::take(&mut buffer));

            let seed_len = char_len(&seed);
            buffer_len = 0;
            if !seed.is_empty() && seed_len + sep_len + piece_len <= max {
                buffer.push_str(&seed);
                buffer.push_str(piece.separator);
                buffer_len = seed_len + sep_len;
            }
            buffer.push_str(piece.text);
            buffer_len += piece_len;
        }

        if !buffer.trim().is_empty() {
            chunks.push(buffer);
        }

        chunks
    }

    /// Drop undersized chunks, keeping the sole chunk of a short article
    fn apply_size_floor(&self, chunks: Vec<String>) -> Vec<String> {
        if chunks.len() == 1 {
            let chunk = &chunks[0];
            let keep = char_len(chunk) >= self.config.min_chunk_size
                || chunk.split_whitespace().count() >= self.config.min_short_article_words;
            if !keep {
                tracing::debug!("Dropping short article chunk ({} chars)", char_len(chunk));
                return Vec::new();
            }
            return chunks;
        }

        let before = chunks.len();
        let kept: Vec<String> = chunks
            .into_iter()
            .filter(|c| char_len(c) >= self.config.min_chunk_size)
            .collect();
        if kept.len() < before {
            tracing::debug!("Discarded {} undersized chunks", before - kept.len());
        }
        kept
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`th character
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{2026}')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}' | '\u{00BB}')
}

/// Byte offsets just past each sentence end (terminator, optional closers,
/// then whitespace)
fn sentence_ends(text: &str) -> Vec<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut ends = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if is_terminator(chars[i].1) {
            let mut j = i + 1;
            while j < chars.len() && (is_terminator(chars[j].1) || is_closing(chars[j].1)) {
                j += 1;
            }
            if j < chars.len() && chars[j].1.is_whitespace() {
                ends.push(chars[j].0);
            }
            i = j;
        } else {
            i += 1;
        }
    }

    ends
}

/// Split text into trimmed sentences, keeping terminal punctuation
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for end in sentence_ends(text) {
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = end;
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Offset of the first sentence start inside `window`, if one leaves text after it
fn first_sentence_start(window: &str) -> Option<usize> {
    let newline = window.find('\n').map(|p| p + 1);
    let sentence = sentence_ends(window).into_iter().next();
    let candidate = match (newline, sentence) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }?;
    if window[candidate..].trim().is_empty() {
        None
    } else {
        Some(candidate)
    }
}

/// Hard split of a token with no usable boundary
fn split_chars(word: &str, max: usize) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in word.char_indices() {
        if count == max {
            slices.push(&word[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < word.len() {
        slices.push(&word[start..]);
    }
    slices
}

/// Unique-word ratio, or None when the chunk is too short to judge
fn vocabulary_diversity(chunk: &str) -> Option<f32> {
    let words: Vec<String> = chunk
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < DIVERSITY_MIN_WORDS {
        return None;
    }
    let unique: HashSet<&String> = words.iter().collect();
    Some(unique.len() as f32 / words.len() as f32)
}
