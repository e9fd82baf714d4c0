//! Field rule table for the decision-letter parser.
//!
//! Each rule maps a pattern to the field it extracts. Rules for the same
//! field are tried in ascending `priority`. The table is evaluated through
//! `first_match` / `all_matches` so each rule can be tested without the
//! line-iteration logic in `parser`.

use std::sync::LazyLock;

use regex::Regex;

/// Lines mentioning any of these describe the aggregate rating, never an
/// individual condition.
pub const AGGREGATE_KEYWORDS: [&str; 6] = [
    "combined",
    "overall",
    "total",
    "final rating",
    "combined rating",
    "overall rating",
];

/// A percentage on a line containing one of these is not a granted rating.
pub const CONDITION_EXCLUSIONS: [&str; 2] = ["denied", "not service"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Rating,
    Date,
    DiagnosticCode,
    Bilateral,
    DenialKeyword,
}

pub struct FieldRule {
    pub field: Field,
    pub regex: Regex,
    /// Lower is tried first.
    pub priority: u8,
    pub description: &'static str,
}

/// One rule hit. `start..end` runs from the captured value to the end of the
/// match, so a guard character in front of a rating is excluded. `value` is
/// capture group 1 when the rule has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: Field,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

impl FieldMatch {
    pub fn overlaps(&self, other: &FieldMatch) -> bool {
        self.start < other.end && other.start < self.end
    }
}

static FIELD_RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    vec![
        rule(Field::Rating, r"(?:^|\D)(\d{1,3})%", 0, "Percentage rating"),
        rule(Field::Date, r"\b(\d{1,2}/\d{1,2}/\d{4})\b", 0, "Numeric date MM/DD/YYYY"),
        rule(
            Field::Date,
            r"(?i)\b((?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:tember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2},\s*\d{4})\b",
            1,
            "Textual date Month DD, YYYY",
        ),
        rule(Field::DiagnosticCode, r"\b(\d{4})\b", 0, "Bare 4-digit diagnostic code"),
        rule(Field::Bilateral, r"(?i)\bbilateral\b", 0, "Bilateral marker"),
        rule(Field::DenialKeyword, r"(?i)\bdenied\b", 0, "Denied"),
        rule(
            Field::DenialKeyword,
            r"(?i)\bnot\s+service[- ]connected\b",
            1,
            "Not service-connected",
        ),
        rule(Field::DenialKeyword, r"(?i)\black\s+of\b", 2, "Lack of"),
        rule(
            Field::DenialKeyword,
            r"(?i)\binsufficient\s+evidence\b",
            3,
            "Insufficient evidence",
        ),
    ]
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•·▪]+\s*|\(?\d{1,2}[.)]\s+)").expect("Invalid list marker regex pattern")
});

fn rule(field: Field, pattern: &str, priority: u8, description: &'static str) -> FieldRule {
    FieldRule {
        field,
        regex: Regex::new(pattern).expect("Invalid field rule regex pattern"),
        priority,
        description,
    }
}

/// Rules for `field`, in the order they are tried.
pub fn rules_for(field: Field) -> Vec<&'static FieldRule> {
    let mut rules: Vec<&FieldRule> = FIELD_RULES.iter().filter(|r| r.field == field).collect();
    rules.sort_by_key(|r| r.priority);
    rules
}

/// The first hit of the highest-priority rule that matches.
pub fn first_match(field: Field, text: &str) -> Option<FieldMatch> {
    rules_for(field).into_iter().find_map(|r| {
        let caps = r.regex.captures(text)?;
        tracing::trace!(rule = r.description, priority = r.priority, "Field rule matched");
        Some(to_match(field, &caps))
    })
}

/// Every hit of every rule for `field`, ordered by position.
pub fn all_matches(field: Field, text: &str) -> Vec<FieldMatch> {
    let mut matches: Vec<FieldMatch> = rules_for(field)
        .into_iter()
        .flat_map(|r| {
            r.regex
                .captures_iter(text)
                .map(|caps| to_match(field, &caps))
                .collect::<Vec<_>>()
        })
        .collect();
    matches.sort_by_key(|m| (m.start, m.end));
    matches
}

/// The leftmost hit of any rule for `field`.
pub fn earliest_match(field: Field, text: &str) -> Option<FieldMatch> {
    all_matches(field, text).into_iter().next()
}

fn to_match(field: Field, caps: &regex::Captures<'_>) -> FieldMatch {
    let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let start = caps.get(1).or_else(|| caps.get(0)).map(|m| m.start()).unwrap_or(0);
    let value = caps
        .get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    FieldMatch {
        field,
        value,
        start,
        end,
    }
}

/// `lower` must already be lowercased.
pub fn is_aggregate_line(lower: &str) -> bool {
    AGGREGATE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// `lower` must already be lowercased.
pub fn is_excluded_from_conditions(lower: &str) -> bool {
    CONDITION_EXCLUSIONS.iter().any(|k| lower.contains(k))
}

/// Strip a leading bullet or list number ("- ", "• ", "2. ", "(3) ").
pub fn strip_list_marker(line: &str) -> &str {
    let trimmed = line.trim();
    match LIST_MARKER.find(trimmed) {
        Some(m) => trimmed[m.end()..].trim_start(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_has_a_rule() {
        for field in [
            Field::Rating,
            Field::Date,
            Field::DiagnosticCode,
            Field::Bilateral,
            Field::DenialKeyword,
        ] {
            assert!(!rules_for(field).is_empty(), "no rule for {field:?}");
        }
    }

    #[test]
    fn every_rule_is_described() {
        assert!(FIELD_RULES.iter().all(|r| !r.description.trim().is_empty()));
    }

    #[test]
    fn rules_are_ordered_by_priority() {
        let priorities: Vec<u8> = rules_for(Field::DenialKeyword)
            .iter()
            .map(|r| r.priority)
            .collect();
        assert_eq!(priorities, vec![0, 1, 2, 3]);
    }

    #[test]
    fn rating_captures_number() {
        let m = first_match(Field::Rating, "Tinnitus 10% effective").unwrap();
        assert_eq!(m.value, "10");
        assert_eq!(&"Tinnitus 10% effective"[m.start..m.end], "10%");
    }

    #[test]
    fn rating_attached_to_a_word() {
        let line = "Tinnitus10% effective 03/15/2024";
        let m = first_match(Field::Rating, line).unwrap();
        assert_eq!(m.value, "10");
        assert_eq!(&line[m.start..m.end], "10%");
    }

    #[test]
    fn rating_ignores_four_digit_percent() {
        assert!(first_match(Field::Rating, "an increase of 1000%").is_none());
    }

    #[test]
    fn numeric_date() {
        let m = first_match(Field::Date, "effective 03/15/2024.").unwrap();
        assert_eq!(m.value, "03/15/2024");
    }

    #[test]
    fn textual_date() {
        let m = first_match(Field::Date, "effective March 3, 2021 based on").unwrap();
        assert_eq!(m.value, "March 3, 2021");
        let m = first_match(Field::Date, "from dec 1,2019").unwrap();
        assert_eq!(m.value, "dec 1,2019");
    }

    #[test]
    fn numeric_date_outranks_textual() {
        let m = first_match(Field::Date, "March 3, 2021 amended 04/01/2021").unwrap();
        assert_eq!(m.value, "04/01/2021");
        let m = earliest_match(Field::Date, "March 3, 2021 amended 04/01/2021").unwrap();
        assert_eq!(m.value, "March 3, 2021");
    }

    #[test]
    fn diagnostic_code_tokens() {
        let matches = all_matches(Field::DiagnosticCode, "DC 9411 and 5260");
        let values: Vec<&str> = matches.iter().map(|m| m.value.as_str()).collect();
        assert_eq!(values, vec!["9411", "5260"]);
        assert!(all_matches(Field::DiagnosticCode, "code 94112").is_empty());
    }

    #[test]
    fn bilateral_is_case_insensitive() {
        assert!(first_match(Field::Bilateral, "BILATERAL hearing loss").is_some());
        assert!(first_match(Field::Bilateral, "unilateral").is_none());
    }

    #[test]
    fn denial_keywords() {
        for line in [
            "Service connection is denied.",
            "Knee condition is not service-connected",
            "Denied due to lack of nexus",
            "There is insufficient evidence of a diagnosis",
        ] {
            assert!(first_match(Field::DenialKeyword, line).is_some(), "{line}");
        }
        assert!(first_match(Field::DenialKeyword, "Service connection granted").is_none());
    }

    #[test]
    fn earliest_denial_keyword_wins_by_position() {
        let line = "Sleep apnea lacks evidence: lack of nexus, therefore denied";
        let m = earliest_match(Field::DenialKeyword, line).unwrap();
        assert_eq!(m.value.to_lowercase(), "lack of");
    }

    #[test]
    fn aggregate_lines() {
        assert!(is_aggregate_line("combined rating: 70%"));
        assert!(is_aggregate_line("your overall evaluation is 90%"));
        assert!(is_aggregate_line("total 100%"));
        assert!(!is_aggregate_line("ptsd 50%"));
    }

    #[test]
    fn list_markers_are_stripped() {
        assert_eq!(strip_list_marker("- Tinnitus"), "Tinnitus");
        assert_eq!(strip_list_marker("• Tinnitus"), "Tinnitus");
        assert_eq!(strip_list_marker("2. Lumbar strain"), "Lumbar strain");
        assert_eq!(strip_list_marker("(3) Migraine"), "Migraine");
        assert_eq!(strip_list_marker("Hypertension"), "Hypertension");
        assert_eq!(strip_list_marker("2.5 mm"), "2.5 mm");
    }

    #[test]
    fn overlapping_spans() {
        let date = first_match(Field::Date, "03/15/2024").unwrap();
        let code = first_match(Field::DiagnosticCode, "03/15/2024").unwrap();
        assert_eq!(code.value, "2024");
        assert!(date.overlaps(&code));
    }
}
