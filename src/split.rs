//! Stratified train/dev/test splitting with named holdout groups.
//!
//! Shuffling is deterministic: every stratum gets its own RNG derived from
//! the run seed and the stratum key, so two runs over identical inputs
//! produce byte-identical partition files.

use crate::models::Example;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("ratios must be non-negative and sum to 1.0 (got {0}, {1}, {2})")]
    BadRatios(f64, f64, f64),
}

/// Split configuration.
#[derive(Debug, Clone)]
pub struct SplitParams {
    pub ratios: (f64, f64, f64),
    pub seed: u64,
    pub holdout_books: Vec<String>,
    pub holdout_name: String,
}

impl Default for SplitParams {
    fn default() -> Self {
        SplitParams {
            ratios: (0.8, 0.1, 0.1),
            seed: 13,
            holdout_books: Vec::new(),
            holdout_name: "holdout".to_string(),
        }
    }
}

/// The four output partitions. Their union equals the input; holdout books
/// never reach the three regular partitions.
#[derive(Debug, Default)]
pub struct SplitSets {
    pub train: Vec<Example>,
    pub dev: Vec<Example>,
    pub test: Vec<Example>,
    pub holdout: Vec<Example>,
}

impl SplitSets {
    pub fn total(&self) -> usize {
        self.train.len() + self.dev.len() + self.test.len() + self.holdout.len()
    }
}

/// Stratified deterministic split by book.
///
/// Holdout books drain to the fourth partition first; the rest is grouped
/// by book, shuffled per stratum under the seed, and cut by cumulative
/// ratios. Every non-zero-ratio partition receives at least one example
/// from a stratum large enough to permit it; smaller strata feed the
/// smallest-ratio partitions first.
pub fn stratified_split(examples: Vec<Example>, params: &SplitParams) -> Result<SplitSets, SplitError> {
    let (r_train, r_dev, r_test) = params.ratios;
    let sum = r_train + r_dev + r_test;
    if r_train < 0.0 || r_dev < 0.0 || r_test < 0.0 || (sum - 1.0).abs() > 1e-6 {
        return Err(SplitError::BadRatios(r_train, r_dev, r_test));
    }

    let holdout_books: HashSet<&str> = params.holdout_books.iter().map(String::as_str).collect();

    let mut sets = SplitSets::default();
    let mut strata: BTreeMap<String, Vec<Example>> = BTreeMap::new();

    for example in examples {
        if holdout_books.contains(example.meta.book.as_str()) {
            sets.holdout.push(example);
        } else {
            strata
                .entry(example.meta.book.clone())
                .or_default()
                .push(example);
        }
    }

    let ratios = [r_train, r_dev, r_test];

    for (book, mut group) in strata {
        let mut rng = StdRng::seed_from_u64(params.seed ^ fnv1a(&book));
        group.shuffle(&mut rng);

        let counts = partition_counts(group.len(), &ratios);

        let mut it = group.into_iter();
        sets.train.extend(it.by_ref().take(counts[0]));
        sets.dev.extend(it.by_ref().take(counts[1]));
        sets.test.extend(it.by_ref().take(counts[2]));
    }

    Ok(sets)
}

/// How many examples of a stratum of size `n` go to each partition.
fn partition_counts(n: usize, ratios: &[f64; 3]) -> [usize; 3] {
    let nonzero: Vec<usize> = (0..3).filter(|&i| ratios[i] > 0.0).collect();

    if n < nonzero.len() {
        // Too small for one-each: smallest ratios are served first.
        let mut order = nonzero.clone();
        order.sort_by(|&a, &b| ratios[a].total_cmp(&ratios[b]).then(a.cmp(&b)));
        let mut counts = [0usize; 3];
        for &idx in order.iter().take(n) {
            counts[idx] = 1;
        }
        return counts;
    }

    // Cumulative-ratio cuts with floor rounding.
    let cut1 = (n as f64 * ratios[0]).floor() as usize;
    let cut2 = (n as f64 * (ratios[0] + ratios[1])).floor() as usize;
    let mut counts = [cut1, cut2.saturating_sub(cut1), n - cut2.min(n)];

    // Each non-zero-ratio partition gets at least one example.
    for &idx in &nonzero {
        if counts[idx] == 0 {
            let donor = (0..3)
                .filter(|&j| counts[j] > 1)
                .max_by_key(|&j| counts[j]);
            if let Some(donor) = donor {
                counts[donor] -= 1;
                counts[idx] += 1;
            }
        }
    }

    counts
}

/// FNV-1a over the stratum key; stable across runs and platforms.
fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
