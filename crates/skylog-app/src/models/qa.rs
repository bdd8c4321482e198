use serde::{Deserialize, Serialize};

/// Parsed output of one verification call: a review per extracted entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaResult {
    #[serde(default)]
    pub results: Vec<QaReview>,
}

/// The verifier's judgement of a single extracted entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QaReview {
    pub entry_index: usize,
    pub verdict: QaVerdict,
    pub issues: Vec<QaIssue>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaVerdict {
    #[default]
    Pass,
    Fail,
    NeedsReview,
}

/// A single field-level problem the verifier found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QaIssue {
    pub field: String,
    pub issue: String,
    pub expected: String,
    pub extracted: String,
    pub severity: QaSeverity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaSeverity {
    Critical,
    #[default]
    Minor,
}

impl QaReview {
    /// True when this review should trigger a re-extraction: a failed verdict
    /// backed by at least one critical issue.
    pub fn is_critical_failure(&self) -> bool {
        self.verdict == QaVerdict::Fail
            && self.issues.iter().any(|i| i.severity == QaSeverity::Critical)
    }
}

/// Issue taxonomy used when building the retry prompt. The verifier emits
/// free-form `issue` strings; anything outside the known kinds maps to
/// [`IssueKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Truncated,
    Incorrect,
    MissingField,
    AddedText,
    WrongClassification,
    Other,
}

impl IssueKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "truncated" => IssueKind::Truncated,
            "incorrect" => IssueKind::Incorrect,
            "missing_field" => IssueKind::MissingField,
            "added_text" => IssueKind::AddedText,
            "wrong_classification" => IssueKind::WrongClassification,
            _ => IssueKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verdicts_and_severities() {
        let raw = r#"{
            "results": [{
                "entryIndex": 0,
                "verdict": "fail",
                "issues": [{
                    "field": "maintenanceNarrative",
                    "issue": "truncated",
                    "expected": "... continued text",
                    "extracted": "Replaced oil filter",
                    "severity": "critical"
                }],
                "summary": "narrative stops mid-sentence"
            }]
        }"#;
        let qa: QaResult = serde_json::from_str(raw).expect("parse");
        assert_eq!(qa.results.len(), 1);
        assert!(qa.results[0].is_critical_failure());
        assert_eq!(IssueKind::parse(&qa.results[0].issues[0].issue), IssueKind::Truncated);
    }

    #[test]
    fn minor_fail_is_not_critical() {
        let review = QaReview {
            verdict: QaVerdict::Fail,
            issues: vec![QaIssue {
                severity: QaSeverity::Minor,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(!review.is_critical_failure());
    }

    #[test]
    fn unknown_issue_kinds_map_to_other() {
        assert_eq!(IssueKind::parse("smudged"), IssueKind::Other);
        assert_eq!(IssueKind::parse("MISSING_FIELD"), IssueKind::MissingField);
    }
}
