//! Criterion benchmarks for greedy token alignment.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use logion::align::align_tokens;

/// Build a synthetic verse of `n` words plus the matching surface list.
fn synthetic_verse(n: usize) -> (String, Vec<String>) {
    let words: Vec<String> = (0..n).map(|i| format!("word{}", i)).collect();
    let text = words.join(" ");
    (text, words)
}

fn bench_alignment(c: &mut Criterion) {
    let sizes = [10, 25, 50];

    let mut group = c.benchmark_group("greedy_align");

    for size in sizes {
        // Every surface present (typical case)
        let (text, words) = synthetic_verse(size);
        let surfaces: Vec<&str> = words.iter().map(String::as_str).collect();

        group.bench_with_input(BenchmarkId::new("all_hits", size), &size, |b, _| {
            b.iter(|| align_tokens(black_box(&text), black_box(&surfaces)))
        });

        // Every third surface absent (forces look-ahead retries)
        let missing: Vec<String> = words
            .iter()
            .enumerate()
            .map(|(i, w)| {
                if i % 3 == 0 {
                    format!("absent{}", i)
                } else {
                    w.clone()
                }
            })
            .collect();
        let missing_surfaces: Vec<&str> = missing.iter().map(String::as_str).collect();

        group.bench_with_input(BenchmarkId::new("third_missing", size), &size, |b, _| {
            b.iter(|| align_tokens(black_box(&text), black_box(&missing_surfaces)))
        });

        // Whitespace mismatch (exact search fails, collapsed retry hits)
        let spaced = words.join("  ");
        let pairs: Vec<String> = words.chunks(2).map(|pair| pair.join(" ")).collect();
        let pair_surfaces: Vec<&str> = pairs.iter().map(String::as_str).collect();

        group.bench_with_input(BenchmarkId::new("collapsed_retry", size), &size, |b, _| {
            b.iter(|| align_tokens(black_box(&spaced), black_box(&pair_surfaces)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_alignment);
criterion_main!(benches);
