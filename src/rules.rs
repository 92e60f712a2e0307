//! Label rules: taxonomy configuration, gazetteers, and lookup tables.
//!
//! The rules file drives the silver annotation pass. Each enabled label
//! carries Strong's keys, lemmas, surfaces, and gazetteer references; a
//! single priority order resolves conflicts between labels.

use crate::models::Token;
use log::warn;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rules file parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no enabled labels in rules file")]
    NoEnabledLabels,
    #[error("duplicate label in priority list: {0}")]
    DuplicatePriority(String),
}

// ============================================================================
// Rules file document
// ============================================================================

/// Raw rules-file document as deserialized from JSON.
#[derive(Debug, Default, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub labels: LabelsSection,
    #[serde(default)]
    pub rules: HashMap<String, RuleSection>,
    #[serde(default)]
    pub conflicts: ConflictsSection,
    #[serde(default)]
    pub merging: MergingSection,
    #[serde(default)]
    pub phrases: PhrasesSection,
    #[serde(default)]
    pub label_on_miss: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LabelsSection {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Per-label rule body.
#[derive(Debug, Default, Deserialize)]
pub struct RuleSection {
    #[serde(default)]
    pub strongs_ids: Vec<String>,
    #[serde(default)]
    pub lemmas: Vec<String>,
    #[serde(default)]
    pub surfaces: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub gazetteer_files: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConflictsSection {
    #[serde(default)]
    pub priority: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MergingSection {
    #[serde(default = "default_true")]
    pub contiguous_merge: bool,
}

impl Default for MergingSection {
    fn default() -> Self {
        MergingSection {
            contiguous_merge: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct PhrasesSection {
    #[serde(default)]
    pub override_labels: Vec<String>,
}

impl RulesConfig {
    /// Parse a rules file from disk.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

// ============================================================================
// Strong's key normalization
// ============================================================================

/// Canonicalize a Strong's key to language prefix + zero-padded 4-digit
/// number: `h430` becomes `H0430`, `g1` becomes `G0001`.
///
/// A value carrying multiple whitespace-separated keys is reduced to its
/// first. Returns `None` for unparseable input. Idempotent on its own
/// output.
pub fn normalize_strongs(raw: &str) -> Option<String> {
    let first = raw.split_whitespace().next()?;
    let mut chars = first.chars();
    let prefix = match chars.next()?.to_ascii_uppercase() {
        'H' => 'H',
        'G' => 'G',
        _ => return None,
    };
    let digits: String = chars.as_str().chars().take_while(char::is_ascii_digit).collect();
    let number: u32 = digits.parse().ok()?;
    Some(format!("{}{:04}", prefix, number))
}

// ============================================================================
// Load report
// ============================================================================

/// Non-fatal findings from rules-engine construction.
///
/// Fatal configuration problems are raised as [`ConfigError`]; everything
/// else is aggregated here for the run summary.
#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    pub labels_enabled: usize,
    pub gazetteer_entries: usize,
    pub missing_gazetteers: Vec<PathBuf>,
    pub malformed_gazetteer_lines: usize,
    pub skipped_rule_entries: Vec<String>,
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub fn has_findings(&self) -> bool {
        !self.missing_gazetteers.is_empty()
            || self.malformed_gazetteer_lines > 0
            || !self.skipped_rule_entries.is_empty()
            || !self.warnings.is_empty()
    }
}

// ============================================================================
// Compiled engine
// ============================================================================

#[derive(Debug)]
struct CompiledRule {
    label: String,
    strongs: HashSet<String>,
    lemmas: HashSet<String>,
    surfaces: HashSet<String>,
    case_sensitive: bool,
}

impl CompiledRule {
    fn matches_surface(&self, surface: &str) -> bool {
        if self.case_sensitive {
            self.surfaces.contains(surface)
        } else {
            self.surfaces.contains(&surface.to_lowercase())
        }
    }
}

#[derive(Debug)]
struct CompiledPhrase {
    label: String,
    tokens: Vec<String>,
    case_sensitive: bool,
    is_override: bool,
}

/// Parallel phrase-label and phrase-override-label assignments for one
/// token sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseMatches {
    pub labels: Vec<Option<String>>,
    pub overrides: Vec<Option<String>>,
}

/// Immutable label resolver compiled from a [`RulesConfig`].
///
/// Construct once, share by reference; all lookups are read-only.
#[derive(Debug)]
pub struct RulesEngine {
    rules: Vec<CompiledRule>,
    rank: HashMap<String, usize>,
    phrases: Vec<CompiledPhrase>,
    label_on_miss: Option<String>,
    contiguous_merge: bool,
    report: LoadReport,
}

impl RulesEngine {
    /// Load and compile a rules file. Gazetteer paths are resolved relative
    /// to the rules file's directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let config = RulesConfig::from_path(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_config(&config, base_dir)
    }

    /// Compile a parsed configuration into lookup tables.
    pub fn from_config(config: &RulesConfig, base_dir: &Path) -> Result<Self, ConfigError> {
        if config.labels.enabled.is_empty() {
            return Err(ConfigError::NoEnabledLabels);
        }

        let mut report = LoadReport::default();

        // Enabled takes precedence over disabled; flag the overlap.
        for label in &config.labels.disabled {
            if config.labels.enabled.contains(label) {
                report
                    .warnings
                    .push(format!("label {} is both enabled and disabled; kept enabled", label));
            }
        }

        // Priority ranks. Labels absent from the list rank after all listed
        // labels, in enabled-declaration order.
        let mut rank: HashMap<String, usize> = HashMap::new();
        for (i, label) in config.conflicts.priority.iter().enumerate() {
            if rank.insert(label.clone(), i).is_some() {
                return Err(ConfigError::DuplicatePriority(label.clone()));
            }
            if !config.labels.enabled.contains(label) {
                report
                    .warnings
                    .push(format!("priority list names a label that is not enabled: {}", label));
            }
        }
        let listed = config.conflicts.priority.len();
        for (i, label) in config.labels.enabled.iter().enumerate() {
            rank.entry(label.clone()).or_insert(listed + i);
        }

        let override_set: HashSet<&String> = config.phrases.override_labels.iter().collect();

        let mut rules = Vec::with_capacity(config.labels.enabled.len());
        let mut phrases = Vec::new();

        for label in &config.labels.enabled {
            let section = match config.rules.get(label) {
                Some(s) => s,
                None => {
                    report
                        .warnings
                        .push(format!("enabled label has no rule body: {}", label));
                    rules.push(CompiledRule {
                        label: label.clone(),
                        strongs: HashSet::new(),
                        lemmas: HashSet::new(),
                        surfaces: HashSet::new(),
                        case_sensitive: false,
                    });
                    continue;
                }
            };

            let mut strongs = HashSet::new();
            for raw in &section.strongs_ids {
                match normalize_strongs(raw) {
                    Some(key) => {
                        strongs.insert(key);
                    }
                    None => report
                        .skipped_rule_entries
                        .push(format!("rule {}: unparseable Strong's key {:?}", label, raw)),
                }
            }

            let lemmas: HashSet<String> = section.lemmas.iter().cloned().collect();

            let mut surfaces: HashSet<String> = HashSet::new();
            for surface in &section.surfaces {
                if surface.trim().is_empty() {
                    report
                        .skipped_rule_entries
                        .push(format!("rule {}: empty surface entry", label));
                    continue;
                }
                surfaces.insert(fold_case(surface, section.case_sensitive));
            }

            for file in &section.gazetteer_files {
                let path = base_dir.join(file);
                match load_gazetteer(&path) {
                    Ok((entries, malformed)) => {
                        report.gazetteer_entries += entries.len();
                        report.malformed_gazetteer_lines += malformed;
                        for entry in entries {
                            surfaces.insert(fold_case(&entry, section.case_sensitive));
                        }
                    }
                    Err(err) => {
                        warn!("gazetteer {} unreadable: {}", path.display(), err);
                        report.missing_gazetteers.push(path);
                    }
                }
            }

            for phrase in &section.phrases {
                let tokens: Vec<String> = phrase
                    .split_whitespace()
                    .map(|t| fold_case(t, section.case_sensitive))
                    .collect();
                if tokens.len() < 2 {
                    report
                        .skipped_rule_entries
                        .push(format!("rule {}: phrase needs at least two tokens: {:?}", label, phrase));
                    continue;
                }
                phrases.push(CompiledPhrase {
                    label: label.clone(),
                    tokens,
                    case_sensitive: section.case_sensitive,
                    is_override: override_set.contains(label),
                });
            }

            rules.push(CompiledRule {
                label: label.clone(),
                strongs,
                lemmas,
                surfaces,
                case_sensitive: section.case_sensitive,
            });
        }

        report.labels_enabled = rules.len();

        Ok(RulesEngine {
            rules,
            rank,
            phrases,
            label_on_miss: config.label_on_miss.clone(),
            contiguous_merge: config.merging.contiguous_merge,
            report,
        })
    }

    /// Enabled labels, in declaration order.
    pub fn enabled_labels(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.label.as_str())
    }

    pub fn is_enabled(&self, label: &str) -> bool {
        self.rules.iter().any(|r| r.label == label)
    }

    pub fn label_on_miss(&self) -> Option<&str> {
        self.label_on_miss.as_deref()
    }

    pub fn contiguous_merge(&self) -> bool {
        self.contiguous_merge
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// Resolve a single token: Strong's key first, then lemma, then surface.
    ///
    /// Returns the miss-label (when configured) if no rule matches.
    pub fn label_token(&self, token: &Token) -> Option<&str> {
        if let Some(raw) = &token.strongs_id {
            if let Some(key) = normalize_strongs(raw) {
                if let Some(label) = self.best_match(|r| r.strongs.contains(&key)) {
                    return Some(label);
                }
            }
        }

        if let Some(lemma) = &token.lemma {
            if let Some(label) = self.best_match(|r| r.lemmas.contains(lemma)) {
                return Some(label);
            }
        }

        if let Some(label) = self.best_match(|r| r.matches_surface(&token.surface)) {
            return Some(label);
        }

        self.label_on_miss.as_deref()
    }

    /// Pick the winning rule among all matches: highest priority first,
    /// declaration order breaking ties.
    fn best_match<F>(&self, pred: F) -> Option<&str>
    where
        F: Fn(&CompiledRule) -> bool,
    {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, r)| pred(r))
            .min_by_key(|(i, r)| (self.rank[&r.label], *i))
            .map(|(_, r)| r.label.as_str())
    }

    fn label_rank(&self, label: &str) -> usize {
        self.rank.get(label).copied().unwrap_or(usize::MAX)
    }

    /// Match all configured phrases against an ordered token sequence.
    ///
    /// Overlaps resolve longest-first, then by label priority. Positions of
    /// an override phrase are additionally recorded in `overrides`.
    pub fn match_phrases(&self, tokens: &[Token]) -> PhraseMatches {
        let n = tokens.len();
        let mut matches = PhraseMatches {
            labels: vec![None; n],
            overrides: vec![None; n],
        };

        if self.phrases.is_empty() || n == 0 {
            return matches;
        }

        // Collect every candidate run, then resolve overlaps greedily.
        let mut candidates: Vec<(usize, usize, usize)> = Vec::new(); // (phrase_idx, start, len)
        for (pi, phrase) in self.phrases.iter().enumerate() {
            let k = phrase.tokens.len();
            if k > n {
                continue;
            }
            for start in 0..=(n - k) {
                let hit = phrase.tokens.iter().enumerate().all(|(j, expected)| {
                    let surface = fold_case(&tokens[start + j].surface, phrase.case_sensitive);
                    surface == *expected
                });
                if hit {
                    candidates.push((pi, start, k));
                }
            }
        }

        candidates.sort_by_key(|&(pi, start, len)| {
            (
                std::cmp::Reverse(len),
                self.label_rank(&self.phrases[pi].label),
                pi,
                start,
            )
        });

        let mut taken = vec![false; n];
        for (pi, start, len) in candidates {
            if taken[start..start + len].iter().any(|&t| t) {
                continue;
            }
            let phrase = &self.phrases[pi];
            for slot in &mut taken[start..start + len] {
                *slot = true;
            }
            for i in start..start + len {
                matches.labels[i] = Some(phrase.label.clone());
                if phrase.is_override {
                    matches.overrides[i] = Some(phrase.label.clone());
                }
            }
        }

        matches
    }

    /// Parallel phrase labels, one per token position.
    pub fn phrase_labels(&self, tokens: &[Token]) -> Vec<Option<String>> {
        self.match_phrases(tokens).labels
    }

    /// Parallel phrase-override labels, absent unless a matched phrase is
    /// configured as an override.
    pub fn phrase_override_labels(&self, tokens: &[Token]) -> Vec<Option<String>> {
        self.match_phrases(tokens).overrides
    }
}

fn fold_case(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}

// ============================================================================
// Gazetteer loading
// ============================================================================

/// Read one gazetteer file. Accepts plain text (one entry per line, `#`
/// comments), CSV/TSV (first column), a JSON list of strings, or a JSON
/// list of objects with a `name` key.
///
/// Returns the entries and the number of malformed lines skipped.
fn load_gazetteer(path: &Path) -> Result<(Vec<String>, usize), std::io::Error> {
    let raw = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("json") => Ok(parse_json_gazetteer(&raw)),
        Some("csv") => Ok(parse_delimited_gazetteer(&raw, ',')),
        Some("tsv") => Ok(parse_delimited_gazetteer(&raw, '\t')),
        _ => Ok(parse_plain_gazetteer(&raw)),
    }
}

fn parse_plain_gazetteer(raw: &str) -> (Vec<String>, usize) {
    let entries = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    (entries, 0)
}

fn parse_delimited_gazetteer(raw: &str, delimiter: char) -> (Vec<String>, usize) {
    let mut entries = Vec::new();
    let mut malformed = 0;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let first = line
            .split(delimiter)
            .next()
            .map(|c| c.trim().trim_matches('"'))
            .unwrap_or("");
        if first.is_empty() {
            malformed += 1;
        } else {
            entries.push(first.to_string());
        }
    }

    (entries, malformed)
}

fn parse_json_gazetteer(raw: &str) -> (Vec<String>, usize) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return (Vec::new(), 1),
    };

    let items = match value.as_array() {
        Some(items) => items,
        None => return (Vec::new(), 1),
    };

    let mut entries = Vec::new();
    let mut malformed = 0;

    for item in items {
        match item {
            serde_json::Value::String(s) if !s.trim().is_empty() => {
                entries.push(s.trim().to_string());
            }
            serde_json::Value::Object(obj) => match obj.get("name").and_then(|n| n.as_str()) {
                Some(name) if !name.trim().is_empty() => entries.push(name.trim().to_string()),
                _ => malformed += 1,
            },
            _ => malformed += 1,
        }
    }

    (entries, malformed)
}
