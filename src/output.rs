//! JSONL emission and run-summary reporting.

use crate::models::{Example, RunSummary, SearchResult};
use crate::rules::LoadReport;
use crate::split::SplitSets;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write examples as line-delimited JSON, one record per line.
pub fn write_jsonl<W: Write>(examples: &[Example], writer: &mut W) -> Result<(), OutputError> {
    for example in examples {
        let line = serde_json::to_string(example)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Write examples as line-delimited JSON to a file.
pub fn write_jsonl_file(examples: &[Example], path: &Path) -> Result<(), OutputError> {
    let mut file = io::BufWriter::new(std::fs::File::create(path)?);
    write_jsonl(examples, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Write the split partitions into `out_dir`.
///
/// `train.jsonl`, `dev.jsonl`, and `test.jsonl` are always written, even
/// when empty. The holdout file is written only when a holdout partition
/// was configured; its name comes from the `holdout_name` key.
pub fn write_partitions(
    sets: &SplitSets,
    out_dir: &Path,
    holdout_name: Option<&str>,
) -> Result<BTreeMap<String, usize>, OutputError> {
    std::fs::create_dir_all(out_dir)?;

    let mut counts = BTreeMap::new();

    for (name, examples) in [
        ("train", &sets.train),
        ("dev", &sets.dev),
        ("test", &sets.test),
    ] {
        write_jsonl_file(examples, &out_dir.join(format!("{}.jsonl", name)))?;
        counts.insert(name.to_string(), examples.len());
    }

    if let Some(name) = holdout_name {
        write_jsonl_file(&sets.holdout, &out_dir.join(format!("{}.jsonl", name)))?;
        counts.insert(name.to_string(), sets.holdout.len());
    }

    Ok(counts)
}

/// Concatenate retrieval hits into a context block, one
/// `"{reference}: {text}"` line per hit.
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("{}: {}", r.reference, r.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print the structured run summary to stdout.
pub fn print_run_summary(summary: &RunSummary, report: &LoadReport) {
    println!("\n=== Annotation Summary ===");
    println!("Verses: {}", summary.total_verses);
    println!(
        "Tokens: {} ({} aligned, {} missed, {:.1}% aligned)",
        summary.total_tokens,
        summary.aligned_tokens,
        summary.alignment_misses,
        summary.alignment_rate() * 100.0
    );
    println!("Examples emitted: {}", summary.examples_emitted);

    println!("\nSpans per label:");
    if summary.spans_per_label.is_empty() {
        println!("  (none)");
    }
    for (label, count) in &summary.spans_per_label {
        println!("  {}: {}", label, count);
    }

    println!("\nPartitions:");
    for (name, count) in &summary.partition_counts {
        println!("  {}: {}", name, count);
    }

    if report.has_findings() {
        println!("\nLoad report:");
        println!("  Labels enabled: {}", report.labels_enabled);
        println!("  Gazetteer entries: {}", report.gazetteer_entries);
        for path in &report.missing_gazetteers {
            println!("  Missing gazetteer: {}", path.display());
        }
        if report.malformed_gazetteer_lines > 0 {
            println!(
                "  Malformed gazetteer lines skipped: {}",
                report.malformed_gazetteer_lines
            );
        }
        for entry in &report.skipped_rule_entries {
            println!("  Skipped rule entry: {}", entry);
        }
        for warning in &report.warnings {
            println!("  Warning: {}", warning);
        }
    }
}
