//! Integration tests for logion.
//!
//! These tests drive the full annotation pipeline end to end over a small
//! file-backed store fixture: schema resolution, token alignment, rule
//! labeling, span building, splitting, and JSONL emission.

use logion::annotate::{build_dataset, AnnotateParams, PipelineError};
use logion::db::DbError;
use logion::models::Example;
use logion::output::write_partitions;
use logion::split::SplitParams;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Build a small store: Genesis (3 verses), John (2), Psalms (1).
fn create_store(dir: &Path) -> PathBuf {
    let path = dir.join("corpus.db");
    let conn = Connection::open(&path).unwrap();

    conn.execute_batch(
        "CREATE TABLE books (id INTEGER PRIMARY KEY, book_name TEXT, testament TEXT, chapter_count INTEGER);
         CREATE TABLE chapters (id INTEGER PRIMARY KEY, book_id INTEGER, chapter_number INTEGER);
         CREATE TABLE verses (id INTEGER PRIMARY KEY, chapter_id INTEGER, verse_num INTEGER, text_plain TEXT);
         CREATE TABLE tokens (id INTEGER PRIMARY KEY, verse_id INTEGER, surface TEXT,
                              strongs_id TEXT, lemma TEXT, pos TEXT, token_idx INTEGER);
         CREATE TABLE cross_references (source_verse_id INTEGER, related_verse_id INTEGER);

         INSERT INTO books VALUES (1, 'Genesis', 'OT', 50);
         INSERT INTO books VALUES (2, 'John', 'NT', 21);
         INSERT INTO books VALUES (3, 'Psalms', 'OT', 150);

         INSERT INTO chapters VALUES (1, 1, 1);
         INSERT INTO chapters VALUES (2, 2, 1);
         INSERT INTO chapters VALUES (3, 3, 1);

         INSERT INTO verses VALUES (1, 1, 1, 'In the beginning God created the heaven and the earth.');
         INSERT INTO verses VALUES (2, 1, 2, 'And the earth was without form, and void.');
         INSERT INTO verses VALUES (3, 1, 3, 'And God said, Let there be light.');
         INSERT INTO verses VALUES (4, 2, 1, 'In the beginning was the Word, and the Word was with God.');
         INSERT INTO verses VALUES (5, 2, 2, 'The same was in the beginning with God.');
         INSERT INTO verses VALUES (6, 3, 1, 'A psalm of King David.');",
    )
    .unwrap();

    let verses: &[(i64, &[(&str, Option<&str>)])] = &[
        (
            1,
            &[
                ("In", None),
                ("the", None),
                ("beginning", None),
                ("God", Some("H430")),
                ("created", None),
                ("the", None),
                ("heaven", None),
                ("and", None),
                ("the", None),
                ("earth", None),
            ],
        ),
        (
            2,
            &[
                ("And", None),
                ("the", None),
                ("earth", None),
                ("was", None),
                ("without", None),
                ("form", None),
                ("and", None),
                ("void", None),
            ],
        ),
        (
            3,
            &[
                ("And", None),
                ("God", Some("H430")),
                ("said", None),
                ("Let", None),
                ("there", None),
                ("be", None),
                ("light", None),
            ],
        ),
        (
            4,
            &[
                ("In", None),
                ("the", None),
                ("beginning", None),
                ("was", None),
                ("the", None),
                ("Word", None),
                ("and", None),
                ("the", None),
                ("Word", None),
                ("was", None),
                ("with", None),
                ("God", Some("G2316")),
            ],
        ),
        (
            5,
            &[
                ("The", None),
                ("same", None),
                ("was", None),
                ("in", None),
                ("the", None),
                ("beginning", None),
                ("with", None),
                ("God", Some("G2316")),
            ],
        ),
        (
            6,
            &[
                ("A", None),
                ("psalm", None),
                ("of", None),
                ("King", None),
                ("David", None),
            ],
        ),
    ];

    let mut token_id = 0;
    for (verse_id, tokens) in verses {
        for (idx, (surface, strongs)) in tokens.iter().enumerate() {
            token_id += 1;
            conn.execute(
                "INSERT INTO tokens VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5)",
                rusqlite::params![token_id, verse_id, surface, strongs, idx as i64],
            )
            .unwrap();
        }
    }

    path
}

fn write_rules(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("rules.json");
    fs::write(&path, json).unwrap();
    path
}

const DEFAULT_RULES: &str = r#"{
    "labels": {"enabled": ["DEITY", "PERSON_TITLE", "PERSON"]},
    "rules": {
        "DEITY": {"strongs_ids": ["H430", "G2316"]},
        "PERSON_TITLE": {"phrases": ["King David"]},
        "PERSON": {"surfaces": ["David"]}
    },
    "conflicts": {"priority": ["DEITY", "PERSON_TITLE", "PERSON"]},
    "merging": {"contiguous_merge": true},
    "phrases": {"override_labels": ["PERSON_TITLE"]}
}"#;

fn all_examples(build: &logion::annotate::DatasetBuild) -> Vec<&Example> {
    build
        .sets
        .train
        .iter()
        .chain(&build.sets.dev)
        .chain(&build.sets.test)
        .chain(&build.sets.holdout)
        .collect()
}

#[test]
fn test_full_pipeline_labels_deity() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    let build = build_dataset(&db, &rules, &AnnotateParams::default(), false).unwrap();

    assert_eq!(build.summary.total_verses, 6);
    assert_eq!(build.summary.examples_emitted, 6);
    assert_eq!(build.summary.alignment_misses, 0);
    assert!((build.summary.alignment_rate() - 1.0).abs() < 1e-9);

    let examples = all_examples(&build);
    let genesis = examples
        .iter()
        .find(|e| e.meta.verse_id == 1)
        .expect("Genesis 1:1 emitted");

    assert_eq!(genesis.spans.len(), 1);
    assert_eq!(genesis.spans[0].start, 17);
    assert_eq!(genesis.spans[0].end, 20);
    assert_eq!(genesis.spans[0].label, "DEITY");
    assert_eq!(build.summary.spans_per_label["DEITY"], 4);
}

#[test]
fn test_phrase_override_end_to_end() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    let build = build_dataset(&db, &rules, &AnnotateParams::default(), false).unwrap();

    let examples = all_examples(&build);
    let psalm = examples
        .iter()
        .find(|e| e.meta.verse_id == 6)
        .expect("Psalms 1:1 emitted");

    // "King David" is one merged override span, not a PERSON span
    assert_eq!(psalm.spans.len(), 1);
    assert_eq!(psalm.spans[0].label, "PERSON_TITLE");
    let covered: String = psalm
        .text
        .chars()
        .skip(psalm.spans[0].start)
        .take(psalm.spans[0].end - psalm.spans[0].start)
        .collect();
    assert_eq!(covered, "King David");
}

#[test]
fn test_emitted_span_invariants() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    let build = build_dataset(&db, &rules, &AnnotateParams::default(), false).unwrap();
    let enabled = ["DEITY", "PERSON_TITLE", "PERSON"];

    for example in all_examples(&build) {
        let text_len = example.text.chars().count();
        for span in &example.spans {
            assert!(span.start < span.end);
            assert!(span.end <= text_len);
            assert!(enabled.contains(&span.label.as_str()));
        }
        for pair in example.spans.windows(2) {
            assert!(pair[0].end <= pair[1].start, "spans overlap or unsorted");
        }
    }
}

#[test]
fn test_split_is_partition_of_input() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    let build = build_dataset(&db, &rules, &AnnotateParams::default(), false).unwrap();

    let mut ids: Vec<i64> = all_examples(&build)
        .iter()
        .map(|e| e.meta.verse_id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_rerun_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);
    let params = AnnotateParams::default();

    let out_a = dir.path().join("run_a");
    let out_b = dir.path().join("run_b");

    let build_a = build_dataset(&db, &rules, &params, false).unwrap();
    write_partitions(&build_a.sets, &out_a, None).unwrap();

    let build_b = build_dataset(&db, &rules, &params, false).unwrap();
    write_partitions(&build_b.sets, &out_b, None).unwrap();

    for name in ["train.jsonl", "dev.jsonl", "test.jsonl"] {
        let bytes_a = fs::read(out_a.join(name)).unwrap();
        let bytes_b = fs::read(out_b.join(name)).unwrap();
        assert_eq!(bytes_a, bytes_b, "{} differs between runs", name);
    }
}

#[test]
fn test_holdout_books_form_fourth_partition() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    let params = AnnotateParams {
        split: SplitParams {
            holdout_books: vec!["John".to_string()],
            holdout_name: "john_eval".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let build = build_dataset(&db, &rules, &params, false).unwrap();

    assert_eq!(build.sets.holdout.len(), 2);
    for example in build
        .sets
        .train
        .iter()
        .chain(&build.sets.dev)
        .chain(&build.sets.test)
    {
        assert_ne!(example.meta.book, "John");
    }

    let out = dir.path().join("out");
    write_partitions(&build.sets, &out, Some("john_eval")).unwrap();
    assert!(out.join("john_eval.jsonl").exists());

    let holdout_lines = fs::read_to_string(out.join("john_eval.jsonl")).unwrap();
    for line in holdout_lines.lines() {
        let example: Example = serde_json::from_str(line).unwrap();
        assert_eq!(example.meta.book, "John");
    }
}

#[test]
fn test_exclude_books_at_read_time() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    let params = AnnotateParams {
        exclude_books: vec!["Psalms".to_string()],
        ..Default::default()
    };

    let build = build_dataset(&db, &rules, &params, false).unwrap();

    assert_eq!(build.summary.total_verses, 5);
    assert!(all_examples(&build)
        .iter()
        .all(|e| e.meta.book != "Psalms"));
}

#[test]
fn test_require_clean_fails_on_plain_store() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    let params = AnnotateParams {
        require_clean: true,
        ..Default::default()
    };

    let err = build_dataset(&db, &rules, &params, false).unwrap_err();
    match err {
        PipelineError::Db(DbError::MissingRequiredColumn { required, .. }) => {
            assert_eq!(required, "text_clean");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_empty_enabled_labels_is_fatal() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), r#"{"labels": {"enabled": []}}"#);

    let err = build_dataset(&db, &rules, &AnnotateParams::default(), false).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn test_all_train_ratios_emit_empty_dev_and_test() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    let params = AnnotateParams {
        split: SplitParams {
            ratios: (1.0, 0.0, 0.0),
            ..Default::default()
        },
        ..Default::default()
    };

    let build = build_dataset(&db, &rules, &params, false).unwrap();
    assert_eq!(build.sets.train.len(), 6);
    assert!(build.sets.dev.is_empty());
    assert!(build.sets.test.is_empty());

    let out = dir.path().join("out");
    write_partitions(&build.sets, &out, None).unwrap();

    assert_eq!(fs::read_to_string(out.join("dev.jsonl")).unwrap(), "");
    assert_eq!(fs::read_to_string(out.join("test.jsonl")).unwrap(), "");
    assert_eq!(
        fs::read_to_string(out.join("train.jsonl"))
            .unwrap()
            .lines()
            .count(),
        6
    );
}

#[test]
fn test_zero_token_verse_handling() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());
    let rules = write_rules(dir.path(), DEFAULT_RULES);

    // Add a verse with no tokens
    let conn = Connection::open(&db).unwrap();
    conn.execute(
        "INSERT INTO verses VALUES (7, 3, 2, 'Selah.')",
        [],
    )
    .unwrap();
    drop(conn);

    // Skipped by default
    let build = build_dataset(&db, &rules, &AnnotateParams::default(), false).unwrap();
    assert_eq!(build.summary.total_verses, 7);
    assert_eq!(build.summary.examples_emitted, 6);

    // Emitted with empty spans when configured
    let params = AnnotateParams {
        emit_empty: true,
        ..Default::default()
    };
    let build = build_dataset(&db, &rules, &params, false).unwrap();
    assert_eq!(build.summary.examples_emitted, 7);

    let examples = all_examples(&build);
    let empty = examples
        .iter()
        .find(|e| e.meta.verse_id == 7)
        .expect("zero-token verse emitted");
    assert!(empty.spans.is_empty());
}

#[test]
fn test_priority_conflict_resolved_end_to_end() {
    let dir = TempDir::new().unwrap();
    let db = create_store(dir.path());

    // "God" matches PERSON by surface and DEITY by Strong's key
    let rules = write_rules(
        dir.path(),
        r#"{
            "labels": {"enabled": ["DEITY", "PERSON"]},
            "rules": {
                "DEITY": {"strongs_ids": ["H430", "G2316"]},
                "PERSON": {"surfaces": ["God"]}
            },
            "conflicts": {"priority": ["DEITY", "PERSON"]}
        }"#,
    );

    let build = build_dataset(&db, &rules, &AnnotateParams::default(), false).unwrap();

    for example in all_examples(&build) {
        for span in &example.spans {
            assert_eq!(span.label, "DEITY");
        }
    }
}
