//! Dataset-build orchestration.
//!
//! This module coordinates the full annotation pipeline for one run:
//! rules loading, corpus reading, alignment, span building, and the
//! stratified split.

use crate::align::align_tokens;
use crate::db::{CorpusReader, DbError};
use crate::models::{Example, RunSummary, TextPrefer};
use crate::rules::{ConfigError, LoadReport, RulesEngine};
use crate::spans::build_spans;
use crate::split::{stratified_split, SplitError, SplitParams, SplitSets};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Db(#[from] DbError),
    #[error("split error: {0}")]
    Split(#[from] SplitError),
}

/// Dataset-build configuration.
#[derive(Debug, Clone, Default)]
pub struct AnnotateParams {
    pub text_prefer: TextPrefer,
    /// Fail fast when `text_clean` is absent.
    pub require_clean: bool,
    pub split: SplitParams,
    /// Books dropped at read time, before annotation.
    pub exclude_books: Vec<String>,
    /// Emit zero-token verses as examples with empty span lists.
    pub emit_empty: bool,
}

/// Everything one run produces before files are written.
#[derive(Debug)]
pub struct DatasetBuild {
    pub sets: SplitSets,
    pub summary: RunSummary,
    pub report: LoadReport,
}

/// Run the full annotation pipeline: read verses, align tokens, resolve
/// labels, build spans, split into partitions.
pub fn build_dataset(
    db_path: &Path,
    rules_path: &Path,
    params: &AnnotateParams,
    show_progress: bool,
) -> Result<DatasetBuild, PipelineError> {
    let engine = RulesEngine::from_path(rules_path)?;

    // require_clean pins the preference to the clean column and makes the
    // resolution strict.
    let prefer = if params.require_clean {
        TextPrefer::Clean
    } else {
        params.text_prefer
    };
    let reader = CorpusReader::open(db_path, prefer, params.require_clean)?;

    if show_progress {
        eprintln!("Text column: {}", reader.schema().resolved_column);
    }

    let exclude: HashSet<String> = params.exclude_books.iter().cloned().collect();
    let mut verses = reader.load_verses(&exclude)?;

    if show_progress {
        eprintln!("Loaded {} verses", verses.len());
    }

    let progress = if show_progress {
        let pb = ProgressBar::new(verses.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut summary = RunSummary::default();
    let mut examples = Vec::with_capacity(verses.len());

    for verse in &mut verses {
        let surfaces: Vec<&str> = verse.tokens.iter().map(|t| t.surface.as_str()).collect();
        let alignment = align_tokens(&verse.text, &surfaces);

        summary.total_verses += 1;
        summary.total_tokens += verse.tokens.len();
        summary.aligned_tokens += alignment.aligned();
        summary.alignment_misses += alignment.misses;

        verse.align_spans = alignment.spans;

        if let Some(pb) = &progress {
            pb.inc(1);
        }

        if verse.tokens.is_empty() && !params.emit_empty {
            continue;
        }

        let spans = build_spans(verse, &engine);
        for span in &spans {
            summary.count_span(&span.label);
        }

        examples.push(Example::from_verse(verse, spans));
    }

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    summary.examples_emitted = examples.len();

    let sets = stratified_split(examples, &params.split)?;

    summary
        .partition_counts
        .insert("train".to_string(), sets.train.len());
    summary
        .partition_counts
        .insert("dev".to_string(), sets.dev.len());
    summary
        .partition_counts
        .insert("test".to_string(), sets.test.len());
    if !params.split.holdout_books.is_empty() {
        summary
            .partition_counts
            .insert(params.split.holdout_name.clone(), sets.holdout.len());
    }

    Ok(DatasetBuild {
        sets,
        summary,
        report: engine.load_report().clone(),
    })
}
