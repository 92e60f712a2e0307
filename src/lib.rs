//! Logion Annotation & Retrieval Library
//!
//! Silver NER annotation and semantic verse retrieval for biblical corpora.
//! Labels morphologically tokenized verses against a priority-ordered
//! taxonomy and builds a dense-vector index over the whole corpus.
//!
//! # Dataset Build Example
//!
//! ```no_run
//! use logion::prelude::*;
//! use std::path::Path;
//!
//! let db_path = Path::new("corpus.db");
//! let rules_path = Path::new("rules.json");
//! let params = AnnotateParams::default();
//!
//! // Read verses, align tokens, label spans, split into partitions
//! let build = build_dataset(db_path, rules_path, &params, false).unwrap();
//!
//! println!(
//!     "{} examples, {:.1}% tokens aligned",
//!     build.summary.examples_emitted,
//!     build.summary.alignment_rate() * 100.0
//! );
//! ```
//!
//! # Retrieval Example
//!
//! ```no_run
//! use logion::prelude::*;
//! use std::path::Path;
//!
//! let retriever = Retriever::open(
//!     Path::new("index/"),
//!     Path::new("model.onnx"),
//!     Path::new("tokenizer.json"),
//! ).unwrap();
//!
//! let hits = retriever.search("For God so loved the world", 5, None, None).unwrap();
//! for hit in &hits {
//!     println!("{}  {:.3}  {}", hit.reference, hit.score, hit.text);
//! }
//! ```

pub mod align;
pub mod annotate;
pub mod db;
pub mod embed;
pub mod models;
pub mod output;
pub mod retrieve;
pub mod rules;
pub mod spans;
pub mod split;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::align::{align_tokens, AlignmentResult};
    pub use crate::annotate::{build_dataset, AnnotateParams, DatasetBuild, PipelineError};
    pub use crate::db::{
        load_corpus_stats, open_corpus, related_verse_ids, resolve_schema, CorpusReader, DbError,
    };
    pub use crate::embed::{
        build_index, EmbedError, EmbeddingConfig, EmbeddingIndex, VerseEncoder,
    };
    pub use crate::models::{
        CorpusStats, Example, ExampleMeta, RunSummary, SchemaInfo, SearchResult, Span, TextPrefer,
        Token, Verse, VerseMeta,
    };
    pub use crate::output::{
        format_context, print_run_summary, write_jsonl, write_jsonl_file, write_partitions,
        OutputError,
    };
    pub use crate::retrieve::{parse_reference, AnswerContext, RetrieveError, Retriever};
    pub use crate::rules::{
        normalize_strongs, ConfigError, LoadReport, PhraseMatches, RulesConfig, RulesEngine,
    };
    pub use crate::spans::build_spans;
    pub use crate::split::{stratified_split, SplitError, SplitParams, SplitSets};
}

// Re-export commonly used types at the crate root
pub use annotate::{build_dataset, AnnotateParams};
pub use models::{Example, Span, Verse};
pub use retrieve::Retriever;
pub use rules::RulesEngine;
