//! Data structures for the logion annotation and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One morphologically analyzed word in a verse.
///
/// Tokens are owned by their verse and immutable after loading. Order within
/// a verse follows the store's `token_idx`.
#[derive(Debug, Clone, Default)]
pub struct Token {
    pub surface: String,
    pub strongs_id: Option<String>,
    pub lemma: Option<String>,
    pub pos: Option<String>,
}

impl Token {
    pub fn new(surface: impl Into<String>) -> Self {
        Token {
            surface: surface.into(),
            ..Default::default()
        }
    }

    pub fn with_strongs(surface: impl Into<String>, strongs: impl Into<String>) -> Self {
        Token {
            surface: surface.into(),
            strongs_id: Some(strongs.into()),
            ..Default::default()
        }
    }
}

/// A canonical Scripture passage with its tokens and alignment offsets.
///
/// `align_spans` is parallel to `tokens` once the aligner has run: `Some`
/// holds a half-open `(start, end)` code-point range into `text`, `None`
/// marks an unaligned token.
#[derive(Debug, Clone)]
pub struct Verse {
    pub verse_id: i64,
    pub book: String,
    pub chapter: i64,
    pub verse: i64,
    pub text: String,
    pub tokens: Vec<Token>,
    pub align_spans: Vec<Option<(usize, usize)>>,
}

impl Verse {
    /// Canonical reference string, e.g. `"John 3:16"`.
    pub fn reference(&self) -> String {
        format!("{} {}:{}", self.book, self.chapter, self.verse)
    }
}

/// A labeled half-open character range `[start, end)` into a verse's text.
///
/// Offsets are Unicode code points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl Span {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Span {
            start,
            end,
            label: label.into(),
        }
    }
}

/// Verse identity carried on every emitted example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleMeta {
    pub book: String,
    pub chapter: i64,
    pub verse: i64,
    pub verse_id: i64,
}

/// An emission-ready annotated record: one verse, its spans, its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    pub spans: Vec<Span>,
    pub meta: ExampleMeta,
}

impl Example {
    pub fn from_verse(verse: &Verse, spans: Vec<Span>) -> Self {
        Example {
            text: verse.text.clone(),
            spans,
            meta: ExampleMeta {
                book: verse.book.clone(),
                chapter: verse.chapter,
                verse: verse.verse,
                verse_id: verse.verse_id,
            },
        }
    }
}

/// Which verse-text column the reader should prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPrefer {
    /// Prefer `text_clean`, then `text_plain`, then a generic `text`.
    #[default]
    Auto,
    /// Require `text_clean` (fall back only when not strict).
    Clean,
    /// Require `text_plain` (fall back only when not strict).
    Plain,
}

/// Descriptor of the verse table's text columns and the resolved choice.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaInfo {
    pub has_text_plain: bool,
    pub has_text_clean: bool,
    pub has_text: bool,
    pub resolved_column: String,
}

/// Per-verse metadata row stored alongside the embedding matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseMeta {
    pub book: String,
    pub chapter: i64,
    pub verse: i64,
    pub reference: String,
    pub text: String,
}

/// One ranked retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub verse_id: i64,
    pub book: String,
    pub chapter: i64,
    pub verse: i64,
    pub reference: String,
    pub text: String,
    pub score: f32,
}

/// Corpus-level counts reported by the `stats` subcommand.
#[derive(Debug, Serialize)]
pub struct CorpusStats {
    pub total_books: u64,
    pub total_chapters: u64,
    pub total_verses: u64,
    pub total_tokens: u64,
}

/// Structured summary of one dataset-build run.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub total_verses: usize,
    pub total_tokens: usize,
    pub aligned_tokens: usize,
    pub alignment_misses: usize,
    pub spans_per_label: BTreeMap<String, usize>,
    pub examples_emitted: usize,
    pub partition_counts: BTreeMap<String, usize>,
}

impl RunSummary {
    /// Fraction of tokens that aligned, in `[0, 1]`.
    pub fn alignment_rate(&self) -> f64 {
        if self.total_tokens == 0 {
            return 1.0;
        }
        self.aligned_tokens as f64 / self.total_tokens as f64
    }

    pub fn count_span(&mut self, label: &str) {
        *self.spans_per_label.entry(label.to_string()).or_default() += 1;
    }
}
