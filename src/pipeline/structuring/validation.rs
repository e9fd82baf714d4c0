// Consistency checks over parsed conditions and the combined rating.
// Advisory only: every problem becomes a warning, nothing is corrected or
// removed. Callers auto-apply the combined rating only when no warnings exist.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};

use super::types::{ExtractedCondition, ValidationWarning, WarningCode};

const RATING_STEP: u8 = 10;
const MAX_RATING: u8 = 100;

/// Validate conditions against each other and against `combined_rating`.
pub fn validate_conditions(
    conditions: &[ExtractedCondition],
    combined_rating: Option<u8>,
) -> Vec<ValidationWarning> {
    validate_conditions_as_of(conditions, combined_rating, Utc::now().date_naive())
}

/// Same as `validate_conditions`, with an explicit "today" for date checks.
pub fn validate_conditions_as_of(
    conditions: &[ExtractedCondition],
    combined_rating: Option<u8>,
    today: NaiveDate,
) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // 1. Combined rating range
    if let Some(combined) = combined_rating {
        if combined > MAX_RATING {
            warnings.push(ValidationWarning::info(
                WarningCode::CombinedOutOfRange,
                format!("Combined rating {combined}% is outside the 0-100% range"),
            ));
        }
    }

    // 2. 10-point granularity
    let non_standard = conditions
        .iter()
        .filter(|c| c.rating % RATING_STEP != 0)
        .count();
    if non_standard > 0 {
        warnings.push(ValidationWarning::info(
            WarningCode::NonStandardRating,
            format!(
                "{non_standard} condition rating(s) are not multiples of 10; ratings are issued in 10% steps"
            ),
        ));
    }

    // 3. Duplicate names
    let duplicates = duplicate_names(conditions);
    if !duplicates.is_empty() {
        warnings.push(ValidationWarning::info(
            WarningCode::DuplicateCondition,
            format!("Duplicate conditions found: {}", duplicates.join(", ")),
        ));
    }

    // 4. Combined below the highest individual rating
    if let (Some(combined), Some(highest)) =
        (combined_rating, conditions.iter().map(|c| c.rating).max())
    {
        if combined < highest {
            warnings.push(ValidationWarning::info(
                WarningCode::CombinedBelowMaximum,
                format!(
                    "Combined rating {combined}% is lower than the highest individual rating {highest}%"
                ),
            ));
        }
    }

    // 5. Effective dates in the future
    let future = conditions
        .iter()
        .filter_map(|c| c.effective_date.as_deref().and_then(parse_effective_date))
        .filter(|date| *date > today)
        .count();
    if future > 0 {
        warnings.push(ValidationWarning::info(
            WarningCode::FutureEffectiveDate,
            format!("{future} effective date(s) are in the future"),
        ));
    }

    // 6. Individual ratings above 100
    let out_of_range = conditions.iter().filter(|c| c.rating > MAX_RATING).count();
    if out_of_range > 0 {
        warnings.push(ValidationWarning::info(
            WarningCode::RatingOutOfRange,
            format!("{out_of_range} condition rating(s) exceed 100%"),
        ));
    }

    if !warnings.is_empty() {
        tracing::debug!(
            conditions = conditions.len(),
            warning_count = warnings.len(),
            "Validation warnings detected"
        );
    }

    warnings
}

/// Names (as first written) that occur more than once, ignoring case.
fn duplicate_names(conditions: &[ExtractedCondition]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut duplicates = Vec::new();
    for condition in conditions {
        let key = condition.name.trim().to_lowercase();
        if !seen.insert(key.clone()) && reported.insert(key) {
            duplicates.push(condition.name.trim().to_string());
        }
    }
    duplicates
}

/// Parse `MM/DD/YYYY` or `Month DD, YYYY`. Unparseable dates yield None.
pub fn parse_effective_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(d);
    }
    let normalized = trimmed.replace('.', "").replace(',', ", ");
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    ["%B %d, %Y", "%b %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
}
