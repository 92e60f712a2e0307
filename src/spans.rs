//! Combine per-token, phrase, and override labels into verse spans.
//!
//! Works on a verse the aligner has already processed. Positions resolve
//! override > phrase > per-token; contiguous same-label runs merge into one
//! span when the rules file enables merging.

use crate::models::{Span, Verse};
use crate::rules::RulesEngine;

/// Build the minimal non-overlapping span list for one aligned verse.
///
/// Unaligned tokens contribute nothing. Every emitted label is a member of
/// the enabled taxonomy; a configured miss-label outside the taxonomy is
/// dropped here.
pub fn build_spans(verse: &Verse, engine: &RulesEngine) -> Vec<Span> {
    debug_assert_eq!(verse.align_spans.len(), verse.tokens.len());

    let phrase_matches = engine.match_phrases(&verse.tokens);

    // Effective label per aligned position, in text order.
    let mut labeled: Vec<(usize, usize, String)> = Vec::new();
    for (i, token) in verse.tokens.iter().enumerate() {
        let (start, end) = match verse.align_spans.get(i).copied().flatten() {
            Some(span) => span,
            None => continue,
        };

        let effective = phrase_matches.overrides[i]
            .as_deref()
            .or(phrase_matches.labels[i].as_deref())
            .or_else(|| engine.label_token(token));

        let label = match effective {
            Some(label) if engine.is_enabled(label) => label,
            _ => continue,
        };

        labeled.push((start, end, label.to_string()));
    }

    if !engine.contiguous_merge() {
        return labeled
            .into_iter()
            .map(|(start, end, label)| Span::new(start, end, label))
            .collect();
    }

    // Merge runs of the same label separated only by whitespace.
    let chars: Vec<char> = verse.text.chars().collect();
    let mut spans: Vec<Span> = Vec::new();

    for (start, end, label) in labeled {
        let merge = match spans.last() {
            Some(last) => last.label == label && whitespace_between(&chars, last.end, start),
            None => false,
        };

        if merge {
            spans.last_mut().unwrap().end = end;
        } else {
            spans.push(Span::new(start, end, label));
        }
    }

    spans
}

/// True when `[from, to)` contains no non-whitespace characters.
fn whitespace_between(chars: &[char], from: usize, to: usize) -> bool {
    if from >= to {
        return true;
    }
    chars[from..to.min(chars.len())]
        .iter()
        .all(|c| c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align_tokens;
    use crate::models::Token;
    use crate::rules::{RulesConfig, RulesEngine};
    use std::path::Path;

    fn engine(json: &str) -> RulesEngine {
        let config: RulesConfig = serde_json::from_str(json).unwrap();
        RulesEngine::from_config(&config, Path::new(".")).unwrap()
    }

    fn verse(text: &str, tokens: Vec<Token>) -> Verse {
        let surfaces: Vec<&str> = tokens.iter().map(|t| t.surface.as_str()).collect();
        let alignment = align_tokens(text, &surfaces);
        Verse {
            verse_id: 1,
            book: "Genesis".to_string(),
            chapter: 1,
            verse: 1,
            text: text.to_string(),
            tokens,
            align_spans: alignment.spans,
        }
    }

    #[test]
    fn test_single_token_deity() {
        let engine = engine(
            r#"{
                "labels": {"enabled": ["DEITY"]},
                "rules": {"DEITY": {"strongs_ids": ["H0430"]}},
                "conflicts": {"priority": ["DEITY"]}
            }"#,
        );

        let text = "In the beginning God created the heaven and the earth.";
        let tokens = vec![
            Token::new("In"),
            Token::new("the"),
            Token::new("beginning"),
            Token::with_strongs("God", "H430"),
            Token::new("created"),
            Token::new("the"),
            Token::new("heaven"),
            Token::new("and"),
            Token::new("the"),
            Token::new("earth"),
        ];

        let verse = verse(text, tokens);
        let spans = build_spans(&verse, &engine);

        assert_eq!(spans, vec![Span::new(17, 20, "DEITY")]);
    }

    #[test]
    fn test_phrase_override_merges_to_one_span() {
        let engine = engine(
            r#"{
                "labels": {"enabled": ["DEITY", "PERSON_TITLE", "PERSON"]},
                "rules": {
                    "DEITY": {"strongs_ids": ["H430"]},
                    "PERSON_TITLE": {"phrases": ["King David"]},
                    "PERSON": {"surfaces": ["David"]}
                },
                "conflicts": {"priority": ["DEITY", "PERSON_TITLE", "PERSON"]},
                "phrases": {"override_labels": ["PERSON_TITLE"]}
            }"#,
        );

        let text = "Then King David rose up.";
        let tokens = vec![
            Token::new("Then"),
            Token::new("King"),
            Token::new("David"),
            Token::new("rose"),
            Token::new("up"),
        ];

        let verse = verse(text, tokens);
        let spans = build_spans(&verse, &engine);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].label, "PERSON_TITLE");
        let covered: String = text
            .chars()
            .skip(spans[0].start)
            .take(spans[0].end - spans[0].start)
            .collect();
        assert_eq!(covered, "King David");
    }

    #[test]
    fn test_priority_resolution_wins() {
        // Token matches PERSON by surface and DEITY by Strong's key
        let engine = engine(
            r#"{
                "labels": {"enabled": ["DEITY", "PERSON"]},
                "rules": {
                    "DEITY": {"strongs_ids": ["H430"]},
                    "PERSON": {"surfaces": ["God"]}
                },
                "conflicts": {"priority": ["DEITY", "PERSON"]}
            }"#,
        );

        let verse = verse("God spoke.", vec![Token::with_strongs("God", "H430")]);
        let spans = build_spans(&verse, &engine);

        assert_eq!(spans, vec![Span::new(0, 3, "DEITY")]);
    }

    #[test]
    fn test_merge_disabled_keeps_separate_spans() {
        let engine = engine(
            r#"{
                "labels": {"enabled": ["PLACE"]},
                "rules": {"PLACE": {"surfaces": ["Ur", "Haran"]}},
                "merging": {"contiguous_merge": false}
            }"#,
        );

        let verse = verse(
            "Ur Haran",
            vec![Token::new("Ur"), Token::new("Haran")],
        );
        let spans = build_spans(&verse, &engine);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], Span::new(0, 2, "PLACE"));
        assert_eq!(spans[1], Span::new(3, 8, "PLACE"));
    }

    #[test]
    fn test_non_adjacent_same_label_not_merged() {
        let engine = engine(
            r#"{
                "labels": {"enabled": ["DEITY"]},
                "rules": {"DEITY": {"surfaces": ["God"]}}
            }"#,
        );

        let verse = verse(
            "God created, God rested",
            vec![
                Token::new("God"),
                Token::new("created"),
                Token::new("God"),
                Token::new("rested"),
            ],
        );
        let spans = build_spans(&verse, &engine);

        // "created," intervenes between the two hits
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[1].start, 13);
    }

    #[test]
    fn test_unaligned_token_contributes_no_span() {
        let engine = engine(
            r#"{
                "labels": {"enabled": ["DEITY"]},
                "rules": {"DEITY": {"surfaces": ["God", "Elohim"]}}
            }"#,
        );

        // "Elohim" is labeled but absent from the text
        let verse = verse(
            "God created",
            vec![Token::new("God"), Token::new("Elohim")],
        );
        let spans = build_spans(&verse, &engine);

        assert_eq!(spans, vec![Span::new(0, 3, "DEITY")]);
    }

    #[test]
    fn test_miss_label_outside_taxonomy_dropped() {
        let engine = engine(
            r#"{
                "labels": {"enabled": ["DEITY"]},
                "rules": {"DEITY": {"surfaces": ["God"]}},
                "label_on_miss": "O"
            }"#,
        );

        let verse = verse(
            "God created man",
            vec![Token::new("God"), Token::new("created"), Token::new("man")],
        );
        let spans = build_spans(&verse, &engine);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].label, "DEITY");
    }

    #[test]
    fn test_spans_sorted_and_disjoint() {
        let engine = engine(
            r#"{
                "labels": {"enabled": ["PERSON", "PLACE"]},
                "rules": {
                    "PERSON": {"surfaces": ["Abram", "Sarai"]},
                    "PLACE": {"surfaces": ["Canaan"]}
                }
            }"#,
        );

        let verse = verse(
            "Abram took Sarai into Canaan",
            vec![
                Token::new("Abram"),
                Token::new("took"),
                Token::new("Sarai"),
                Token::new("into"),
                Token::new("Canaan"),
            ],
        );
        let spans = build_spans(&verse, &engine);

        assert_eq!(spans.len(), 3);
        for pair in spans.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(pair[0].end <= pair[1].start);
        }
    }
}
