use serde::{Deserialize, Serialize};

/// Technical status of a review invocation. Distinct from [`ReviewOutcome`],
/// which classifies the findings themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Success,
    ModelUnavailable,
    Error,
    Skipped,
}

/// Semantic classification derived from the findings, independent of status.
/// A `model_unavailable` review can still carry warnings from a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Critical,
    Warnings,
    Success,
}

/// An inline replacement proposed by the reviewer for a specific line range.
/// An empty `suggested_code` means "delete these lines".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSuggestion {
    pub file: String,
    pub line_start: usize,
    pub line_end: usize,
    pub description: String,
    pub suggested_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub status: ReviewStatus,
    pub critical_issues: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,

    #[serde(default)]
    pub code_suggestions: Vec<CodeSuggestion>,

    #[serde(default)]
    pub fallback_used: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,

    #[serde(default)]
    pub chunks_reviewed: usize,

    #[serde(default)]
    pub total_chunks: usize,
}

impl ReviewResult {
    pub fn new(status: ReviewStatus) -> Self {
        Self {
            status,
            critical_issues: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            code_suggestions: Vec::new(),
            fallback_used: false,
            raw_response: None,
            chunks_reviewed: 0,
            total_chunks: 0,
        }
    }

    /// A clean pass: nothing to flag, no network involved.
    pub fn success_empty() -> Self {
        Self::new(ReviewStatus::Success)
    }

    pub fn outcome(&self) -> ReviewOutcome {
        if !self.critical_issues.is_empty() {
            ReviewOutcome::Critical
        } else if !self.warnings.is_empty() {
            ReviewOutcome::Warnings
        } else {
            ReviewOutcome::Success
        }
    }

    /// Exit code for the CLI gate. `model_unavailable` is deliberately
    /// non-blocking so endpoint outages never prevent a commit on their own.
    pub fn exit_code(&self, strict: bool) -> i32 {
        match self.status {
            ReviewStatus::Skipped => 5,
            ReviewStatus::ModelUnavailable => 3,
            _ if !self.critical_issues.is_empty() => 1,
            _ if !self.warnings.is_empty() && strict => 1,
            _ if !self.warnings.is_empty() => 2,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_ranks_critical_over_warnings() {
        let mut result = ReviewResult::success_empty();
        assert_eq!(result.outcome(), ReviewOutcome::Success);

        result.warnings.push("minor thing".to_string());
        assert_eq!(result.outcome(), ReviewOutcome::Warnings);

        result.critical_issues.push("big thing".to_string());
        assert_eq!(result.outcome(), ReviewOutcome::Critical);
    }

    #[test]
    fn outcome_is_independent_of_status() {
        let mut result = ReviewResult::new(ReviewStatus::ModelUnavailable);
        result.warnings.push("from fallback".to_string());
        assert_eq!(result.outcome(), ReviewOutcome::Warnings);
    }

    #[test]
    fn exit_codes_match_gate_contract() {
        let clean = ReviewResult::success_empty();
        assert_eq!(clean.exit_code(false), 0);

        let mut warned = ReviewResult::success_empty();
        warned.warnings.push("w".to_string());
        assert_eq!(warned.exit_code(false), 2);
        assert_eq!(warned.exit_code(true), 1);

        let mut critical = ReviewResult::success_empty();
        critical.critical_issues.push("c".to_string());
        assert_eq!(critical.exit_code(false), 1);

        let unavailable = ReviewResult::new(ReviewStatus::ModelUnavailable);
        assert_eq!(unavailable.exit_code(false), 3);

        let skipped = ReviewResult::new(ReviewStatus::Skipped);
        assert_eq!(skipped.exit_code(false), 5);
    }
}
