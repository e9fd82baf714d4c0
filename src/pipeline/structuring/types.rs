use serde::{Deserialize, Serialize};

/// A service-connected condition parsed from a decision letter.
///
/// Every field is a best-effort reading and stays editable downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCondition {
    pub name: String,
    /// Percentage as printed. Parsed records never exceed 100.
    pub rating: u8,
    pub diagnostic_code: Option<String>,
    /// As printed: `MM/DD/YYYY` or `Month DD, YYYY`.
    pub effective_date: Option<String>,
    pub bilateral: bool,
    /// The trimmed line the rating was read from.
    pub source_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDeniedCondition {
    pub name: String,
    pub denial_date: Option<String>,
    /// The denial line, at most 200 characters.
    pub denial_reason: Option<String>,
}

/// Everything the parser found in one document's text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDecision {
    pub conditions: Vec<ExtractedCondition>,
    pub denied: Vec<ExtractedDeniedCondition>,
}

impl ParsedDecision {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.denied.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Advisory only. Nothing in the pipeline blocks on a warning.
    Info,
}

/// Machine-readable warning kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    CombinedOutOfRange,
    NonStandardRating,
    DuplicateCondition,
    CombinedBelowMaximum,
    FutureEffectiveDate,
    RatingOutOfRange,
    NoMeaningfulContent,
    PageSkipped,
    PageCap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub message: String,
    pub severity: Severity,
    pub code: WarningCode,
}

impl ValidationWarning {
    pub fn info(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Info,
            code,
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
