//! Minors guard.
//!
//! Redaction is done with explicit character walks rather than regular
//! expressions so that word boundaries and case folding behave the same way
//! everywhere the output is checked.

use lifegraph_schemas::{Allowlist, CanonicalRecord, MinorsPolicy};
use tracing::info;

/// Replacement for blocked-pattern matches
pub const REDACTION_TOKEN: &str = "[redacted]";

/// True if the full name, or its first whitespace-delimited token, is a
/// configured minor first name (case-insensitive).
pub fn is_minor(name: &str, allowlist: &Allowlist) -> bool {
    let full = name.trim().to_lowercase();
    if full.is_empty() {
        return false;
    }
    let first = full.split_whitespace().next().unwrap_or_default();

    allowlist.minors.first_names.iter().any(|minor| {
        let minor = minor.trim().to_lowercase();
        !minor.is_empty() && (minor == full || minor == first)
    })
}

/// Redact a record that references a minor: strip last names following any
/// minor first name, redact blocked patterns, null the location and set the
/// minor flag. Records that reference no minor are returned unchanged.
pub fn enforce_minors_policy(mut record: CanonicalRecord, allowlist: &Allowlist) -> CanonicalRecord {
    let references_minor = record
        .entities
        .people
        .iter()
        .any(|person| is_minor(person, allowlist));

    if !references_minor && !record.is_minor {
        return record;
    }

    record.title = redact_minor_text(&record.title, &allowlist.minors);
    record.description = redact_minor_text(&record.description, &allowlist.minors);
    record.location = None;
    record.is_minor = true;

    info!("Applied minors policy to {}", record.id);
    record
}

fn redact_minor_text(text: &str, policy: &MinorsPolicy) -> String {
    let mut out = text.to_string();
    for first_name in &policy.first_names {
        out = strip_last_names(&out, first_name);
    }
    redact_blocked_patterns(&out, &policy.blocked_patterns)
}

/// Remove the run of capitalized words that directly follows each
/// whole-word, case-insensitive occurrence of `first_name`.
///
/// After a match, the walk repeatedly consumes one whitespace run plus one
/// capitalized word (an uppercase letter followed by lowercase letters,
/// hyphens or apostrophes) and stops at the first token that does not fit.
pub fn strip_last_names(text: &str, first_name: &str) -> String {
    let needle: Vec<char> = first_name.trim().chars().collect();
    if needle.is_empty() {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if word_matches_at(&chars, i, &needle) {
            let end = i + needle.len();
            out.extend(&chars[i..end]);
            i = skip_capitalized_run(&chars, end);
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

/// Replace every case-insensitive occurrence of each pattern with [`REDACTION_TOKEN`].
///
/// All patterns are matched in one pass over the original text, longest
/// match first, so no pattern ever matches inside an inserted token.
pub fn redact_blocked_patterns(text: &str, patterns: &[String]) -> String {
    let needles: Vec<Vec<char>> = patterns
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| p.chars().collect())
        .collect();
    if needles.is_empty() {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let longest = needles
            .iter()
            .filter(|needle| matches_at(&chars, i, needle))
            .map(Vec::len)
            .max();
        match longest {
            Some(len) => {
                out.push_str(REDACTION_TOKEN);
                i += len;
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

/// First mixed-case word (such as "McKay" or "O'Neil") directly following a
/// minor first name in `text`.
///
/// [`strip_last_names`] only consumes plain capitalized words, so this is
/// what the final audit uses to catch a surname it left behind.
pub fn surname_after_minor(text: &str, first_names: &[String]) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    for first_name in first_names {
        let needle: Vec<char> = first_name.trim().chars().collect();
        if needle.is_empty() {
            continue;
        }
        for i in 0..chars.len() {
            if !word_matches_at(&chars, i, &needle) {
                continue;
            }
            let mut start = i + needle.len();
            while start < chars.len() && chars[start].is_whitespace() {
                start += 1;
            }
            if start == i + needle.len() {
                continue;
            }
            let mut end = start;
            while end < chars.len()
                && (is_word_char(chars[end]) || chars[end] == '\'' || chars[end] == '-')
            {
                end += 1;
            }
            let word = &chars[start..end];
            let leads_upper = word.first().is_some_and(|c| c.is_uppercase());
            if leads_upper && word.iter().any(|c| c.is_lowercase()) {
                return Some(word.iter().collect());
            }
        }
    }
    None
}

/// Case-insensitive substring test using the same folding as the redactor
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return false;
    }
    let chars: Vec<char> = haystack.chars().collect();
    (0..chars.len()).any(|i| matches_at(&chars, i, &needle))
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

fn matches_at(chars: &[char], at: usize, needle: &[char]) -> bool {
    let end = at + needle.len();
    end <= chars.len()
        && chars[at..end]
            .iter()
            .zip(needle)
            .all(|(a, b)| chars_eq_ignore_case(*a, *b))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn word_matches_at(chars: &[char], at: usize, needle: &[char]) -> bool {
    if at > 0 && is_word_char(chars[at - 1]) {
        return false;
    }
    let end = at + needle.len();
    if end < chars.len() && is_word_char(chars[end]) {
        return false;
    }
    matches_at(chars, at, needle)
}

fn skip_capitalized_run(chars: &[char], mut pos: usize) -> usize {
    loop {
        let mut cursor = pos;
        while cursor < chars.len() && chars[cursor].is_whitespace() {
            cursor += 1;
        }
        if cursor == pos {
            return pos;
        }
        match capitalized_word_end(chars, cursor) {
            Some(end) => pos = end,
            None => return pos,
        }
    }
}

fn capitalized_word_end(chars: &[char], start: usize) -> Option<usize> {
    let first = *chars.get(start)?;
    if !first.is_uppercase() {
        return None;
    }

    let mut end = start + 1;
    while end < chars.len() && (chars[end].is_lowercase() || chars[end] == '-' || chars[end] == '\'') {
        end += 1;
    }

    // "McKay" or "R2" are not plain capitalized words. They stay in the text
    // and surname_after_minor reports them to the audit.
    if end < chars.len() && is_word_char(chars[end]) {
        return None;
    }
    Some(end)
}
