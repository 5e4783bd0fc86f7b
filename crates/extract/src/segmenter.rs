//! Sentence segmentation for Latin and CJK text.

use serde::Serialize;

/// Units shorter than this (in characters) are absorbed into a neighbour.
pub const DEFAULT_MIN_SENTENCE_CHARS: usize = 20;

/// A contiguous span of source text sent as one extraction request.
///
/// `start..end` are byte offsets into the source and `text` is exactly that
/// slice, so it never carries leading or trailing whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceUnit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl SentenceUnit {
    fn span(source: &str, start: usize, end: usize) -> Self {
        let raw = &source[start..end];
        let leading = raw.len() - raw.trim_start().len();
        let trailing = raw.len() - raw.trim_end().len();
        let (start, end) = if leading == raw.len() {
            (start, start)
        } else {
            (start + leading, end - trailing)
        };
        Self {
            start,
            end,
            text: source[start..end].to_string(),
        }
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Runs of non-terminal characters closed by one or more terminals.
///
/// Terminals with nothing before them are skipped and a trailing run
/// without a terminal is not a sentence.
fn raw_sentences(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut run_start = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminal(c) {
            run_start.get_or_insert(i);
            continue;
        }
        let Some(start) = run_start.take() else {
            continue;
        };
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !is_terminal(next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }
        spans.push((start, end));
    }
    spans
}

/// Split `text` into sentence units.
///
/// A sentence shorter than `min_chars` is merged into the unit before it.
/// Short sentences at the very beginning have no predecessor, so they are
/// held back and merged into the first long enough sentence instead (or
/// emitted together if none follows). Text without any terminal punctuation
/// becomes a single unit when it is not blank.
pub fn segment(text: &str, min_chars: usize) -> Vec<SentenceUnit> {
    let mut units: Vec<SentenceUnit> = Vec::new();
    let mut pending: Option<(usize, usize)> = None;

    for (start, end) in raw_sentences(text) {
        let short = text[start..end].trim().chars().count() < min_chars;
        if short {
            if let Some(last) = units.last_mut() {
                *last = SentenceUnit::span(text, last.start, end);
            } else {
                let held_start = pending.map_or(start, |(s, _)| s);
                pending = Some((held_start, end));
            }
            continue;
        }
        let start = pending.take().map_or(start, |(s, _)| s);
        units.push(SentenceUnit::span(text, start, end));
    }

    if let Some((start, end)) = pending {
        units.push(SentenceUnit::span(text, start, end));
    }

    if units.is_empty() && !text.trim().is_empty() {
        units.push(SentenceUnit::span(text, 0, text.len()));
    }
    units
}
