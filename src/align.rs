//! Greedy left-to-right alignment of token surfaces to verse text.
//!
//! This runs once per verse over the whole corpus. All offsets are Unicode
//! code points into the verse text, never bytes.

/// Code points to scan past the cursor when retrying a match with
/// collapsed whitespace.
const LOOKAHEAD_WINDOW: usize = 200;

/// Alignment output: one offset pair per input surface, plus a miss count.
///
/// `spans[i]` is `Some((start, end))` when surface `i` was located, `None`
/// when it was not. Successful offsets are strictly non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentResult {
    pub spans: Vec<Option<(usize, usize)>>,
    pub misses: usize,
}

impl AlignmentResult {
    pub fn aligned(&self) -> usize {
        self.spans.iter().filter(|s| s.is_some()).count()
    }
}

/// Align an ordered list of token surfaces against verse text.
///
/// Maintains a cursor that only moves forward: each surface is searched as
/// an exact substring at or after the cursor, with a whitespace-collapsed
/// retry inside a bounded look-ahead window. A miss records `None` and
/// leaves the cursor unchanged, so repeated words always bind to the
/// leftmost remaining occurrence.
pub fn align_tokens(text: &str, surfaces: &[&str]) -> AlignmentResult {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::with_capacity(surfaces.len());
    let mut misses = 0usize;
    let mut cursor = 0usize;

    for surface in surfaces {
        let needle: Vec<char> = surface.chars().collect();

        // Surfaces with nothing searchable are skipped, not counted as misses.
        if needle.is_empty() || !needle.iter().any(|c| c.is_alphanumeric()) {
            spans.push(None);
            continue;
        }

        let hit = find_exact(&chars, cursor, &needle)
            .or_else(|| find_collapsed(&chars, cursor, &needle));

        match hit {
            Some((start, end)) => {
                spans.push(Some((start, end)));
                cursor = end;
            }
            None => {
                spans.push(None);
                misses += 1;
            }
        }
    }

    AlignmentResult { spans, misses }
}

/// Exact substring search at or after `from`.
fn find_exact(haystack: &[char], from: usize, needle: &[char]) -> Option<(usize, usize)> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let last_start = haystack.len() - needle.len();
    for start in from..=last_start {
        if haystack[start..start + needle.len()] == *needle {
            return Some((start, start + needle.len()));
        }
    }
    None
}

/// Whitespace-collapsed retry within the look-ahead window.
///
/// Runs of whitespace in both the text window and the surface are treated
/// as a single space; the returned offsets refer to the original text.
fn find_collapsed(haystack: &[char], from: usize, needle: &[char]) -> Option<(usize, usize)> {
    let window_end = (from + LOOKAHEAD_WINDOW + needle.len()).min(haystack.len());
    if from >= window_end {
        return None;
    }

    // Collapse the window, remembering where each kept char came from.
    let mut collapsed: Vec<char> = Vec::with_capacity(window_end - from);
    let mut origin: Vec<usize> = Vec::with_capacity(window_end - from);
    let mut in_space = false;
    for (i, &c) in haystack[from..window_end].iter().enumerate() {
        if c.is_whitespace() {
            if !in_space {
                collapsed.push(' ');
                origin.push(from + i);
                in_space = true;
            }
        } else {
            collapsed.push(c);
            origin.push(from + i);
            in_space = false;
        }
    }

    let needle_collapsed = collapse_whitespace(needle);
    let (start, end) = find_exact(&collapsed, 0, &needle_collapsed)?;

    // Map back: end is exclusive, so take the origin of the last matched
    // char and extend past it.
    let orig_start = origin[start];
    let orig_end = origin[end - 1] + 1;
    Some((orig_start, orig_end))
}

fn collapse_whitespace(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len());
    let mut in_space = false;
    for &c in chars {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
