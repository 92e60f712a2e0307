//! Logion Annotation & Retrieval Pipeline
//!
//! Silver NER annotation and semantic verse retrieval for biblical corpora.
//! Labels morphologically tokenized verses against a rule taxonomy and
//! serves similarity search over a dense verse index.

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;

mod align;
mod annotate;
mod db;
mod embed;
mod models;
mod output;
mod retrieve;
mod rules;
mod spans;
mod split;

use annotate::{build_dataset, AnnotateParams};
use db::{load_corpus_stats, open_corpus, related_verse_ids};
use embed::{build_index, EmbeddingConfig, VerseEncoder};
use models::{SearchResult, TextPrefer};
use output::{print_run_summary, write_partitions};
use retrieve::{parse_reference, Retriever};
use split::SplitParams;

#[derive(Parser)]
#[command(name = "logion")]
#[command(about = "Silver NER annotation and semantic verse retrieval for biblical corpora")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Text column preference (CLI version)
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliTextPrefer {
    /// Prefer text_clean, then text_plain, then text
    Auto,
    /// Require text_clean
    Clean,
    /// Require text_plain
    Plain,
}

impl From<CliTextPrefer> for TextPrefer {
    fn from(prefer: CliTextPrefer) -> Self {
        match prefer {
            CliTextPrefer::Auto => TextPrefer::Auto,
            CliTextPrefer::Clean => TextPrefer::Clean,
            CliTextPrefer::Plain => TextPrefer::Plain,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the silver NER dataset from the verse store
    Annotate {
        /// Path to the verse/token store
        #[arg(long)]
        corpus_db: PathBuf,

        /// Path to the rules file (JSON)
        #[arg(long)]
        rules: PathBuf,

        /// Directory for the partition files
        #[arg(long)]
        out_dir: PathBuf,

        /// Text column selection: auto, clean, or plain
        #[arg(long, value_enum, default_value = "auto")]
        text_prefer: CliTextPrefer,

        /// Fail if text_clean is absent
        #[arg(long)]
        require_clean: bool,

        /// Seed controlling all shuffling
        #[arg(long, default_value = "13")]
        seed: u64,

        /// Train partition ratio
        #[arg(long, default_value = "0.8")]
        train_ratio: f64,

        /// Dev partition ratio
        #[arg(long, default_value = "0.1")]
        dev_ratio: f64,

        /// Test partition ratio
        #[arg(long, default_value = "0.1")]
        test_ratio: f64,

        /// Books held out of the regular split (comma separated)
        #[arg(long, value_delimiter = ',')]
        holdout_books: Vec<String>,

        /// File name for the holdout partition
        #[arg(long, default_value = "holdout")]
        holdout_name: String,

        /// Books excluded entirely at read time (comma separated)
        #[arg(long, value_delimiter = ',')]
        exclude_books: Vec<String>,

        /// Emit zero-token verses as examples with empty spans
        #[arg(long)]
        emit_empty: bool,

        /// Suppress progress output
        #[arg(long)]
        quiet: bool,
    },

    /// Encode the corpus into the embedding index
    Embed {
        /// Path to the verse/token store
        #[arg(long)]
        corpus_db: PathBuf,

        /// Path to the ONNX encoder model
        #[arg(long)]
        model: PathBuf,

        /// Path to the tokenizer file
        #[arg(long)]
        tokenizer: PathBuf,

        /// Directory for the index artifacts
        #[arg(long)]
        out_dir: PathBuf,

        /// Prefix each verse with its reference before encoding
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        include_context: bool,

        /// Encoder batch size
        #[arg(long, default_value = "32")]
        batch_size: usize,

        /// Text column selection: auto, clean, or plain
        #[arg(long, value_enum, default_value = "auto")]
        text_prefer: CliTextPrefer,

        /// Suppress progress output
        #[arg(long)]
        quiet: bool,
    },

    /// Semantic search over the embedding index
    Search {
        /// Directory holding the index artifacts
        #[arg(long)]
        index_dir: PathBuf,

        /// Path to the ONNX encoder model
        #[arg(long)]
        model: PathBuf,

        /// Path to the tokenizer file
        #[arg(long)]
        tokenizer: PathBuf,

        /// Query text
        query: String,

        /// Number of results
        #[arg(long, default_value = "5")]
        top_k: usize,

        /// Restrict results to one book
        #[arg(long)]
        book: Option<String>,

        /// Minimum similarity score
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Verses most similar to a referenced verse
    Crossref {
        /// Directory holding the index artifacts
        #[arg(long)]
        index_dir: PathBuf,

        /// Path to the ONNX encoder model
        #[arg(long)]
        model: PathBuf,

        /// Path to the tokenizer file
        #[arg(long)]
        tokenizer: PathBuf,

        /// Canonical reference, e.g. "John 3:16"
        reference: String,

        /// Number of results
        #[arg(long, default_value = "5")]
        top_k: usize,

        /// Also show stored cross-references from this store
        #[arg(long)]
        corpus_db: Option<PathBuf>,
    },

    /// Retrieval context for a question
    Ask {
        /// Directory holding the index artifacts
        #[arg(long)]
        index_dir: PathBuf,

        /// Path to the ONNX encoder model
        #[arg(long)]
        model: PathBuf,

        /// Path to the tokenizer file
        #[arg(long)]
        tokenizer: PathBuf,

        /// Question text
        question: String,

        /// Number of retrieved verses
        #[arg(long, default_value = "5")]
        top_k: usize,
    },

    /// Show corpus statistics
    Stats {
        /// Path to the verse/token store
        #[arg(long)]
        corpus_db: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Annotate {
            corpus_db,
            rules,
            out_dir,
            text_prefer,
            require_clean,
            seed,
            train_ratio,
            dev_ratio,
            test_ratio,
            holdout_books,
            holdout_name,
            exclude_books,
            emit_empty,
            quiet,
        } => {
            let has_holdouts = !holdout_books.is_empty();
            let params = AnnotateParams {
                text_prefer: text_prefer.into(),
                require_clean,
                split: SplitParams {
                    ratios: (train_ratio, dev_ratio, test_ratio),
                    seed,
                    holdout_books,
                    holdout_name: holdout_name.clone(),
                },
                exclude_books,
                emit_empty,
            };

            let build = build_dataset(&corpus_db, &rules, &params, !quiet)?;

            write_partitions(
                &build.sets,
                &out_dir,
                has_holdouts.then_some(holdout_name.as_str()),
            )?;

            if !quiet {
                print_run_summary(&build.summary, &build.report);
                eprintln!("\nOutput: {}", out_dir.display());
            }
        }

        Commands::Embed {
            corpus_db,
            model,
            tokenizer,
            out_dir,
            include_context,
            batch_size,
            text_prefer,
            quiet,
        } => {
            let reader = db::CorpusReader::open(&corpus_db, text_prefer.into(), false)?;
            let verses = reader.load_verses(&Default::default())?;

            if !quiet {
                eprintln!("Encoding {} verses...", verses.len());
            }

            let mut encoder = VerseEncoder::new(&model, &tokenizer)?;
            let config = EmbeddingConfig {
                include_context,
                batch_size,
            };

            let index = build_index(&verses, &mut encoder, &config, !quiet)?;
            index.save(&out_dir)?;

            if !quiet {
                eprintln!(
                    "Indexed {} verses (dim {}) into {}",
                    index.len(),
                    index.dim(),
                    out_dir.display()
                );
            }
        }

        Commands::Search {
            index_dir,
            model,
            tokenizer,
            query,
            top_k,
            book,
            min_score,
        } => {
            let mut retriever = Retriever::open(&index_dir, &model, &tokenizer)?;
            let hits = retriever.search(&query, top_k, book.as_deref(), min_score)?;
            print_results(&hits);
        }

        Commands::Crossref {
            index_dir,
            model,
            tokenizer,
            reference,
            top_k,
            corpus_db,
        } => {
            let retriever = Retriever::open(&index_dir, &model, &tokenizer)?;
            let hits = retriever.cross_reference(&reference, top_k)?;

            if hits.is_empty() {
                println!("No verse found for reference: {}", reference);
            } else {
                print_results(&hits);
            }

            // Stored cross-references from the upstream enrichers, when a
            // store is at hand
            if let Some(db_path) = corpus_db {
                if let Some((book, chapter, verse)) = parse_reference(&reference) {
                    let canonical = format!("{} {}:{}", book, chapter, verse);
                    let conn = open_corpus(&db_path)?;
                    if let Some(verse_id) = retriever.index().lookup_reference(&canonical) {
                        let related = related_verse_ids(&conn, verse_id)?;
                        if !related.is_empty() {
                            println!("\n=== Stored Cross-References ===");
                            for id in related {
                                match retriever.index().meta(id) {
                                    Some(meta) => println!("  {}: {}", meta.reference, meta.text),
                                    None => println!("  verse id {}", id),
                                }
                            }
                        }
                    }
                }
            }
        }

        Commands::Ask {
            index_dir,
            model,
            tokenizer,
            question,
            top_k,
        } => {
            let mut retriever = Retriever::open(&index_dir, &model, &tokenizer)?;
            let answer = retriever.answer_context(&question, top_k)?;

            println!("=== Context ===");
            println!("{}", answer.context);
            println!("\n=== Scores ===");
            for hit in &answer.results {
                println!("  {:.3}  {}", hit.score, hit.reference);
            }
        }

        Commands::Stats { corpus_db } => {
            let stats = load_corpus_stats(&corpus_db)?;

            println!("=== Corpus Statistics ===");
            println!("Books: {}", stats.total_books);
            println!("Chapters: {}", stats.total_chapters);
            println!("Verses: {}", stats.total_verses);
            println!("Tokens: {}", stats.total_tokens);
        }
    }

    Ok(())
}

/// Print ranked hits in a human-readable format.
fn print_results(hits: &[SearchResult]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!("{:2}. {:.3}  {}  {}", rank + 1, hit.score, hit.reference, hit.text);
    }
}
