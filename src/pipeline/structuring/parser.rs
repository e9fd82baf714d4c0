//! Line-oriented parser for rating decision text.
//!
//! A single forward pass over the non-empty trimmed lines, with one line of
//! lookbehind (names) and one line of lookahead (dates). Ambiguity never
//! fails the parse: a record with a placeholder name beats no record,
//! since every field is reviewed by a human afterwards.

use tracing::debug;

use super::rules::{
    all_matches, earliest_match, first_match, is_aggregate_line, is_excluded_from_conditions,
    strip_list_marker, Field,
};
use super::types::{ExtractedCondition, ExtractedDeniedCondition, ParsedDecision};

const NAME_MIN_CHARS: usize = 4;
const NAME_MAX_CHARS: usize = 99;
const DENIAL_REASON_MAX_CHARS: usize = 200;

pub const UNKNOWN_CONDITION: &str = "Unknown condition";

/// Parse granted and denied conditions out of one document's text.
pub fn parse_decision_text(text: &str) -> ParsedDecision {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut decision = ParsedDecision::default();
    for (i, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        if is_aggregate_line(&lower) {
            continue;
        }

        let previous = i.checked_sub(1).map(|j| lines[j]);
        let next = lines.get(i + 1).copied();

        if let Some(condition) = parse_condition_line(line, &lower, previous, next) {
            decision.conditions.push(condition);
        } else if let Some(denied) = parse_denial_line(line, previous, next) {
            decision.denied.push(denied);
        }
    }

    debug!(
        lines = lines.len(),
        conditions = decision.conditions.len(),
        denied = decision.denied.len(),
        "Parsed decision text"
    );
    decision
}

/// The combined rating the letter states about itself, if any: the first
/// aggregate line carrying a percentage of at most 100.
pub fn detect_stated_combined_rating(text: &str) -> Option<u8> {
    text.lines()
        .map(str::trim)
        .filter(|line| is_aggregate_line(&line.to_lowercase()))
        .filter_map(|line| first_match(Field::Rating, line))
        .filter_map(|m| m.value.parse::<u8>().ok())
        .find(|rating| *rating <= 100)
}

fn parse_condition_line(
    line: &str,
    lower: &str,
    previous: Option<&str>,
    next: Option<&str>,
) -> Option<ExtractedCondition> {
    if is_excluded_from_conditions(lower) {
        return None;
    }
    let rating_match = first_match(Field::Rating, line)?;
    let rating = rating_match
        .value
        .parse::<u8>()
        .ok()
        .filter(|r| *r <= 100)?;

    let name = name_from_prefix(&line[..rating_match.start])
        .or_else(|| {
            previous
                .map(strip_list_marker)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| UNKNOWN_CONDITION.to_string());

    let dates = all_matches(Field::Date, line);
    let diagnostic_code = all_matches(Field::DiagnosticCode, line)
        .into_iter()
        .find(|code| {
            !code.overlaps(&rating_match)
                && !line[code.end..].starts_with('%')
                && !dates.iter().any(|d| d.overlaps(code))
        })
        .map(|m| m.value);

    Some(ExtractedCondition {
        name,
        rating,
        diagnostic_code,
        effective_date: date_on_or_after(line, next),
        bilateral: first_match(Field::Bilateral, line).is_some(),
        source_line: line.to_string(),
    })
}

fn parse_denial_line(
    line: &str,
    previous: Option<&str>,
    next: Option<&str>,
) -> Option<ExtractedDeniedCondition> {
    let keyword = earliest_match(Field::DenialKeyword, line)?;

    // A previous line that is itself a rating or another denial belongs to
    // a different record.
    let name = previous
        .map(strip_list_marker)
        .filter(|p| {
            first_match(Field::Rating, p).is_none()
                && first_match(Field::DenialKeyword, p).is_none()
                && name_length_ok(p)
        })
        .map(str::to_string)
        .or_else(|| name_before_denial(&line[..keyword.start]))
        .unwrap_or_else(|| UNKNOWN_CONDITION.to_string());

    Some(ExtractedDeniedCondition {
        name,
        denial_date: date_on_or_after(line, next),
        denial_reason: Some(truncate_chars(line, DENIAL_REASON_MAX_CHARS)),
    })
}

fn date_on_or_after(line: &str, next: Option<&str>) -> Option<String> {
    first_match(Field::Date, line)
        .or_else(|| next.and_then(|n| first_match(Field::Date, n)))
        .map(|m| m.value)
}

fn name_from_prefix(prefix: &str) -> Option<String> {
    let name = trim_separators(strip_list_marker(prefix));
    name_length_ok(name).then(|| name.to_string())
}

fn name_before_denial(prefix: &str) -> Option<String> {
    let name = trim_separators(strip_list_marker(prefix));
    let name = strip_prefix_ignore_case(name, "service connection for");
    let name = strip_trailing_word(name, "is");
    let name = trim_separators(strip_trailing_word(name, "was"));
    name_length_ok(name).then(|| name.to_string())
}

fn name_length_ok(name: &str) -> bool {
    (NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name.chars().count())
}

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, ':' | '-' | '–' | ',' | ';' | '.' | '=' | '(')
    })
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> &'a str {
    let n = prefix.len();
    if s.len() >= n && s.is_char_boundary(n) && s[..n].eq_ignore_ascii_case(prefix) {
        s[n..].trim_start()
    } else {
        s
    }
}

/// Remove a trailing whole word such as "is" in "Tinnitus is".
fn strip_trailing_word<'a>(s: &'a str, word: &str) -> &'a str {
    let s = s.trim_end();
    if s.len() <= word.len() {
        return s;
    }
    let split = s.len() - word.len();
    if !s.is_char_boundary(split) || !s[split..].eq_ignore_ascii_case(word) {
        return s;
    }
    let head = &s[..split];
    if head.ends_with(char::is_whitespace) {
        head.trim_end()
    } else {
        s
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
