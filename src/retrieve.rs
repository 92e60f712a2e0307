//! Semantic retrieval over the embedding index.
//!
//! Wraps the loaded index with the query-side encoder and the text-level
//! contracts: free-text search, cross-reference lookup, and answer-context
//! assembly. Malformed queries return empty results, never errors; only
//! missing index artifacts are fatal, at construction.

use crate::embed::{EmbedError, EmbeddingIndex, VerseEncoder};
use crate::models::SearchResult;
use crate::output::format_context;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("index error: {0}")]
    Index(#[from] EmbedError),
}

/// Top-k retrieval output plus the concatenated context block handed to a
/// downstream answerer.
#[derive(Debug)]
pub struct AnswerContext {
    pub results: Vec<SearchResult>,
    pub context: String,
}

/// Parse a canonical reference string `"<Book Name> <chapter>:<verse>"`.
///
/// Book names may themselves contain spaces and digits (`1 Corinthians`),
/// so the chapter:verse pair is taken from the last whitespace-separated
/// field. Returns `None` when the shape does not match.
pub fn parse_reference(reference: &str) -> Option<(String, i64, i64)> {
    let trimmed = reference.trim();
    let (book, locator) = trimmed.rsplit_once(char::is_whitespace)?;
    let (chapter, verse) = locator.split_once(':')?;

    let book = book.trim();
    if book.is_empty() {
        return None;
    }

    Some((
        book.to_string(),
        chapter.trim().parse().ok()?,
        verse.trim().parse().ok()?,
    ))
}

/// Query-side retrieval engine: immutable index plus encoder.
pub struct Retriever {
    index: EmbeddingIndex,
    encoder: VerseEncoder,
}

impl Retriever {
    /// Load the index artifacts and the encoder. Any missing artifact is
    /// fatal here.
    pub fn open(
        index_dir: &Path,
        model_path: &Path,
        tokenizer_path: &Path,
    ) -> Result<Self, RetrieveError> {
        let index = EmbeddingIndex::load(index_dir)?;
        let encoder = VerseEncoder::new(model_path, tokenizer_path)?;
        Ok(Retriever { index, encoder })
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Free-text semantic search.
    ///
    /// Returns at most `top_k` hits sorted by descending cosine score,
    /// optionally restricted to one book and/or a minimum score. An empty
    /// or whitespace-only query yields an empty result.
    pub fn search(
        &mut self,
        query: &str,
        top_k: usize,
        book_filter: Option<&str>,
        min_score: Option<f32>,
    ) -> Result<Vec<SearchResult>, RetrieveError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.encoder.encode(query)?;
        Ok(self
            .index
            .search_by_vector(&vector, top_k, book_filter, min_score, None))
    }

    /// Verses most similar to a referenced verse, excluding the verse
    /// itself. Unknown references yield an empty result.
    pub fn cross_reference(
        &self,
        reference: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, RetrieveError> {
        let canonical = match parse_reference(reference) {
            Some((book, chapter, verse)) => format!("{} {}:{}", book, chapter, verse),
            None => return Ok(Vec::new()),
        };

        let verse_id = match self.index.lookup_reference(&canonical) {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        Ok(self.index.neighbors_of(verse_id, top_k))
    }

    /// Retrieval output for question answering: the top-k hits verbatim
    /// plus a `"{reference}: {text}"` per-line context block. No answer
    /// generation happens here.
    pub fn answer_context(
        &mut self,
        question: &str,
        top_k: usize,
    ) -> Result<AnswerContext, RetrieveError> {
        let results = self.search(question, top_k, None, None)?;
        let context = format_context(&results);
        Ok(AnswerContext { results, context })
    }
}
