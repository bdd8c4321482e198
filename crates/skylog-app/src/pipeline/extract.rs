//! Per-slice extract-and-verify loop.
//!
//! Extraction runs at most twice per slice. Each extraction is checked by a
//! verification model (a different provider when available, the extractor
//! itself otherwise); a failed verdict with a critical issue buys exactly
//! one retry with a corrective prompt. Model failures never propagate: the
//! worst outcome for a slice is zero entries with a warning.

use crate::models::{ExtractedEntry, ExtractionResult, QaResult, QaSeverity, QaVerdict};
use crate::services::model::{GenerateConfig, GenerativeModel, Part};

use super::prompts::{build_retry_prompt, SLICE_EXTRACTION_PROMPT, VERIFICATION_PROMPT};

const MAX_EXTRACTION_ATTEMPTS: usize = 2;

/// Accepted output for one slice.
#[derive(Debug, Default)]
pub struct SliceExtraction {
    pub entries: Vec<ExtractedEntry>,
    pub page_type: String,
}

/// Run the extract-and-verify loop for one slice image.
pub async fn extract_and_verify(
    extractor: &dyn GenerativeModel,
    verifier: Option<&dyn GenerativeModel>,
    image: &[u8],
    mime_type: &str,
) -> SliceExtraction {
    let mut prompt = SLICE_EXTRACTION_PROMPT.to_string();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let Some(mut extraction) = run_extraction(extractor, &prompt, image, mime_type).await
        else {
            return SliceExtraction::default();
        };

        if extraction.entries.is_empty() {
            return SliceExtraction {
                entries: Vec::new(),
                page_type: extraction.page_type,
            };
        }

        let extraction_json = match serde_json::to_string(&extraction) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize extraction for QA");
                return accept(extraction);
            }
        };

        let Some(qa) =
            run_verification(extractor, verifier, image, mime_type, &extraction_json).await
        else {
            // Both verifiers unavailable: accept unverified, do not flag.
            return accept(extraction);
        };

        let mut critical_issues = Vec::new();
        let mut critical_indexes = Vec::new();
        for review in &qa.results {
            let Some(entry) = extraction.entries.get_mut(review.entry_index) else {
                tracing::warn!(entry_index = review.entry_index, "QA review for unknown entry");
                continue;
            };
            match review.verdict {
                QaVerdict::Pass => {}
                QaVerdict::NeedsReview => flag_entry(entry, &review.summary),
                QaVerdict::Fail => {
                    if review.is_critical_failure() {
                        critical_indexes.push(review.entry_index);
                        critical_issues.extend(
                            review
                                .issues
                                .iter()
                                .filter(|i| i.severity == QaSeverity::Critical)
                                .cloned(),
                        );
                    } else {
                        flag_entry(entry, &review.summary);
                    }
                }
            }
        }

        if critical_issues.is_empty() {
            return accept(extraction);
        }

        if attempt >= MAX_EXTRACTION_ATTEMPTS {
            tracing::warn!(
                attempts = attempt,
                issues = critical_issues.len(),
                "extraction attempts exhausted with critical QA issues, accepting flagged"
            );
            for review in &qa.results {
                if critical_indexes.contains(&review.entry_index) {
                    if let Some(entry) = extraction.entries.get_mut(review.entry_index) {
                        flag_entry(entry, &review.summary);
                    }
                }
            }
            return accept(extraction);
        }

        tracing::info!(
            issues = critical_issues.len(),
            "QA flagged critical issues, retrying extraction with corrective prompt"
        );
        prompt = build_retry_prompt(SLICE_EXTRACTION_PROMPT, &critical_issues);
    }
}

fn accept(extraction: ExtractionResult) -> SliceExtraction {
    SliceExtraction {
        entries: extraction.entries,
        page_type: extraction.page_type,
    }
}

fn flag_entry(entry: &mut ExtractedEntry, summary: &str) {
    entry.needs_review = true;
    if !summary.is_empty() {
        if !entry.extraction_notes.is_empty() {
            entry.extraction_notes.push_str("; ");
        }
        entry.extraction_notes.push_str("QA: ");
        entry.extraction_notes.push_str(summary);
    }
}

async fn run_extraction(
    extractor: &dyn GenerativeModel,
    prompt: &str,
    image: &[u8],
    mime_type: &str,
) -> Option<ExtractionResult> {
    let parts = [Part::text(prompt), Part::image(image, mime_type)];
    let raw = match extractor.generate(&parts, &GenerateConfig::json_extraction()).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "extraction model call failed, skipping slice");
            return None;
        }
    };

    let cleaned = strip_markdown_fences(&raw);
    if cleaned.is_empty() {
        tracing::warn!("extraction model returned empty output, skipping slice");
        return None;
    }

    match serde_json::from_str::<ExtractionResult>(cleaned) {
        Ok(extraction) => Some(extraction),
        Err(err) => {
            tracing::warn!(error = %err, "extraction output unparseable, skipping slice");
            None
        }
    }
}

async fn run_verification(
    extractor: &dyn GenerativeModel,
    verifier: Option<&dyn GenerativeModel>,
    image: &[u8],
    mime_type: &str,
    extraction_json: &str,
) -> Option<QaResult> {
    let parts = [
        Part::text(VERIFICATION_PROMPT),
        Part::image(image, mime_type),
        Part::text(format!("EXTRACTION TO VERIFY:\n{extraction_json}")),
    ];
    let config = GenerateConfig::json_extraction();

    let primary = verifier.unwrap_or(extractor);
    match call_verifier(primary, &parts, &config).await {
        Some(qa) => Some(qa),
        None if verifier.is_some() => {
            tracing::warn!("primary verifier failed, falling back to extraction model");
            call_verifier(extractor, &parts, &config).await
        }
        None => None,
    }
}

async fn call_verifier(
    model: &dyn GenerativeModel,
    parts: &[Part],
    config: &GenerateConfig,
) -> Option<QaResult> {
    let raw = match model.generate(parts, config).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "verification call failed");
            return None;
        }
    };
    match serde_json::from_str::<QaResult>(strip_markdown_fences(&raw)) {
        Ok(qa) => Some(qa),
        Err(err) => {
            tracing::warn!(error = %err, "verification output unparseable");
            None
        }
    }
}

/// Strip a wrapping ``` / ```json fence, if present.
pub fn strip_markdown_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model::ModelError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns scripted responses in order; records received prompts.
    struct ScriptedModel {
        responses: Mutex<Vec<Result<String, ()>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String, ()>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }

        fn calls(&self) -> usize {
            self.prompts().len()
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(
            &self,
            parts: &[Part],
            _config: &GenerateConfig,
        ) -> Result<String, ModelError> {
            let prompt = parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            self.prompts.lock().expect("prompts lock").push(prompt);

            let next = self.responses.lock().expect("responses lock").remove(0);
            next.map_err(|_| ModelError::Empty)
        }
    }

    fn entry_json(narrative: &str) -> String {
        format!(
            r#"{{"pageType":"maintenance_entry","entries":[{{"date":"2024-01-15","maintenanceNarrative":"{narrative}"}}]}}"#
        )
    }

    fn qa_pass() -> String {
        r#"{"results":[{"entryIndex":0,"verdict":"pass","issues":[],"summary":"faithful"}]}"#.into()
    }

    fn qa_critical_truncation() -> String {
        r#"{"results":[{"entryIndex":0,"verdict":"fail","issues":[{"field":"maintenanceNarrative","issue":"truncated","expected":"full text","extracted":"partial","severity":"critical"}],"summary":"narrative truncated"}]}"#.into()
    }

    #[tokio::test]
    async fn passing_extraction_is_accepted_clean() {
        let extractor = ScriptedModel::new(vec![Ok(entry_json("Replaced oil filter."))]);
        let verifier = ScriptedModel::new(vec![Ok(qa_pass())]);

        let out = extract_and_verify(&extractor, Some(&verifier), b"img", "image/jpeg").await;
        assert_eq!(out.entries.len(), 1);
        assert!(!out.entries[0].needs_review);
        assert_eq!(out.page_type, "maintenance_entry");
        assert_eq!(extractor.calls(), 1);
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn critical_failure_retries_once_then_passes() {
        // Attempt 1: truncated narrative; attempt 2: full narrative passes.
        let extractor = ScriptedModel::new(vec![
            Ok(entry_json("Replaced oil")),
            Ok(entry_json("Replaced oil filter and safety wired per manual.")),
        ]);
        let verifier = ScriptedModel::new(vec![Ok(qa_critical_truncation()), Ok(qa_pass())]);

        let out = extract_and_verify(&extractor, Some(&verifier), b"img", "image/jpeg").await;
        assert_eq!(out.entries.len(), 1);
        assert!(!out.entries[0].needs_review);
        assert_eq!(
            out.entries[0].maintenance_narrative,
            "Replaced oil filter and safety wired per manual."
        );

        // Second extraction used the corrective prompt, without QA's value.
        let prompts = extractor.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("stopped too early"));
        assert!(prompts[1].contains("Re-examine the original image yourself."));
        assert!(!prompts[1].contains("full text"));
    }

    #[tokio::test]
    async fn exhausted_retries_accept_with_review_flag() {
        let extractor = ScriptedModel::new(vec![
            Ok(entry_json("Replaced oil")),
            Ok(entry_json("Replaced oil")),
        ]);
        let verifier = ScriptedModel::new(vec![
            Ok(qa_critical_truncation()),
            Ok(qa_critical_truncation()),
        ]);

        let out = extract_and_verify(&extractor, Some(&verifier), b"img", "image/jpeg").await;
        assert_eq!(out.entries.len(), 1);
        assert!(out.entries[0].needs_review);
        assert!(out.entries[0].extraction_notes.contains("narrative truncated"));
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn needs_review_verdict_flags_and_accepts() {
        let extractor = ScriptedModel::new(vec![Ok(entry_json("Partially legible entry"))]);
        let verifier = ScriptedModel::new(vec![Ok(
            r#"{"results":[{"entryIndex":0,"verdict":"needs_review","issues":[],"summary":"smudged ink"}]}"#
                .to_string(),
        )]);

        let out = extract_and_verify(&extractor, Some(&verifier), b"img", "image/jpeg").await;
        assert!(out.entries[0].needs_review);
        assert!(out.entries[0].extraction_notes.contains("smudged ink"));
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn zero_entries_skip_verification() {
        let extractor =
            ScriptedModel::new(vec![Ok(r#"{"pageType":"cover","entries":[]}"#.to_string())]);
        let verifier = ScriptedModel::new(vec![]);

        let out = extract_and_verify(&extractor, Some(&verifier), b"img", "image/jpeg").await;
        assert!(out.entries.is_empty());
        assert_eq!(out.page_type, "cover");
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn extraction_failure_returns_empty_not_error() {
        let extractor = ScriptedModel::new(vec![Err(())]);
        let out = extract_and_verify(&extractor, None, b"img", "image/jpeg").await;
        assert!(out.entries.is_empty());
    }

    #[tokio::test]
    async fn unparseable_extraction_returns_empty() {
        let extractor = ScriptedModel::new(vec![Ok("not json".to_string())]);
        let out = extract_and_verify(&extractor, None, b"img", "image/jpeg").await;
        assert!(out.entries.is_empty());
    }

    #[tokio::test]
    async fn fenced_json_is_unwrapped() {
        let fenced = format!("```json\n{}\n```", entry_json("Entry text"));
        let extractor = ScriptedModel::new(vec![Ok(fenced), Ok(qa_pass())]);
        // No separate verifier: the extractor verifies its own output.
        let out = extract_and_verify(&extractor, None, b"img", "image/jpeg").await;
        assert_eq!(out.entries.len(), 1);
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn primary_verifier_failure_falls_back_to_extractor() {
        let extractor = ScriptedModel::new(vec![Ok(entry_json("Entry")), Ok(qa_pass())]);
        let verifier = ScriptedModel::new(vec![Err(())]);

        let out = extract_and_verify(&extractor, Some(&verifier), b"img", "image/jpeg").await;
        assert_eq!(out.entries.len(), 1);
        assert!(!out.entries[0].needs_review);
        // Extractor called twice: extraction + fallback verification.
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn both_verifiers_failing_accepts_unverified() {
        let extractor = ScriptedModel::new(vec![Ok(entry_json("Entry")), Err(())]);
        let verifier = ScriptedModel::new(vec![Err(())]);

        let out = extract_and_verify(&extractor, Some(&verifier), b"img", "image/jpeg").await;
        assert_eq!(out.entries.len(), 1);
        assert!(!out.entries[0].needs_review, "unverified acceptance must not flag");
    }

    #[test]
    fn fence_stripping_variants() {
        assert_eq!(strip_markdown_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_markdown_fences("  {} "), "{}");
        assert_eq!(strip_markdown_fences(""), "");
    }
}
