//! Prompt construction for slice extraction and QA verification.
//!
//! These helpers stay pure; the extract loop owns when each prompt is sent.

use crate::models::{IssueKind, QaIssue};

/// Sent to the extraction model with each cropped entry strip. Demands
/// verbatim transcription: no summarizing, no grammar correction.
pub const SLICE_EXTRACTION_PROMPT: &str = r#"You are an expert data entry specialist. Your job is to transcribe this single logbook entry VERBATIM.

CONTEXT: You are viewing a cropped image containing a single aircraft maintenance logbook entry (or a sticker/label). This image was sliced from a full logbook page.

VERBATIM TRANSCRIPTION RULES — FOLLOW THESE EXACTLY:
- Do NOT summarize, shorten, paraphrase, or correct grammar
- Preserve abbreviations EXACTLY as written: "w/o", "R/R", "c/w", "IAW", "P/N", "S/N", "A/W", "I/C", "O/H", etc.
- If the text has a typo or misspelling, transcribe the typo exactly as written
- Include EVERY word visible in the text — do not stop until you reach the visual end of the text block
- If text wraps across multiple lines, join into one continuous narrative preserving every word
- Do NOT add words, punctuation, or formatting that is not visible in the image
- Numbers, part numbers, serial numbers: copy character-for-character

WHAT TO EXTRACT:
- Entry date (convert to ISO format YYYY-MM-DD)
- Aircraft identification (registration/N-number, serial number, make, model)
- Time readings at completion (hobbs, tach, flight time, TSN/TSMOH for engine entries)
- Shop/facility information (name, address, phone, CRS/repair station number)
- Mechanic/technician (name, A&P number, IA number if applicable)
- Work order number
- Complete maintenance narrative (VERBATIM — every single word)
- AD compliance noted (AD numbers and compliance method)
- Parts actions (installed, removed, replaced, repaired) with P/N, S/N, quantity
- Any inspection signoffs (annual, 100hr, etc.)

ENTRY TYPE CLASSIFICATION RULES:
- "inspection" = any inspection event (annual, 100-hour, progressive, altimeter/static, transponder, ELT check). Always set inspectionType to the specific subtype.
- "ad_compliance" = work performed specifically to comply with an Airworthiness Directive
- "maintenance" = routine maintenance, repairs, oil changes, component replacements, STC installations
- "other" = anything that does not fit the above categories

SPECIAL CASES:
- If this slice shows a header row, blank space, or non-entry content: return {"pageType": "other", "entries": []}
- Most slices contain exactly 1 entry. If you see 2 entries, return both.
- If a value is unclear, include your best guess with [?] marker
- If a field is completely illegible, use null and list in missingData
- Confidence should reflect how certain you are of the extraction accuracy
- Flag for review if confidence < 0.85 OR critical data is missing
- DO NOT invent or fill in data that is not visible

Return JSON format:
{
  "pageType": "maintenance_entry" | "inspection_form" | "parts_list" | "cover" | "blank" | "other",
  "entries": [
    {
      "date": "YYYY-MM-DD",
      "aircraftRegistration": "N-number",
      "aircraftSerial": "serial number",
      "aircraftMake": "make",
      "aircraftModel": "model",
      "hobbsTime": null,
      "tachTime": null,
      "flightTime": null,
      "timeSinceOverhaul": null,
      "shopName": "shop name",
      "shopAddress": "full address if visible",
      "shopPhone": "phone if visible",
      "repairStationNumber": "CRS number if visible",
      "mechanicName": "name",
      "mechanicCertificate": "A&P or IA number",
      "workOrderNumber": "work order #",
      "maintenanceNarrative": "COMPLETE VERBATIM transcription of ALL text in the work performed section",
      "entryType": "maintenance" | "inspection" | "ad_compliance" | "other",
      "adCompliance": [
        {"adNumber": "AD number", "method": "inspection|replacement|modification|terminating_action", "notes": ""}
      ],
      "partsActions": [
        {
          "action": "installed" | "removed" | "replaced" | "repaired" | "inspected" | "overhauled",
          "partName": "description",
          "partNumber": "P/N",
          "serialNumber": "S/N or null",
          "oldPartNumber": "P/N of removed part",
          "oldSerialNumber": "S/N of removed part",
          "quantity": 1
        }
      ],
      "inspectionType": "annual" | "100hr" | "50hr" | "progressive" | "altimeter_static" | "transponder" | "elt" | null,
      "farReference": "FAR reference if mentioned",
      "confidence": 0.0,
      "missingData": [],
      "uncertainFields": [],
      "needsReview": false,
      "extractionNotes": ""
    }
  ]
}"#;

/// Sent to the verification model together with the slice image and the
/// extraction JSON under review.
pub const VERIFICATION_PROMPT: &str = r#"You are a quality assurance reviewer for aircraft logbook transcription. You are given a cropped logbook entry image and the JSON another system extracted from it. Compare the extraction to the image field by field.

ERROR TAXONOMY:
Entry-level errors:
- "missing_entry": an entry visible in the image is absent from the extraction
- "fabricated_entry": an extracted entry does not appear in the image

Field-level errors:
- "incorrect": the extracted value does not match the image
- "truncated": the extracted text stops before the visual end of the text
- "missing_field": a value clearly visible in the image was not extracted
- "added_text": the extraction contains words not present in the image
- "wrong_classification": entryType or inspectionType does not match the entry content

SEVERITY RULES:
- "critical": dates, times, part numbers, serial numbers, AD numbers, or a narrative that is truncated, fabricated, or materially wrong
- "minor": formatting drift, casing, harmless spacing

DO NOT flag missing aircraft identity fields (registration, serial, make, model). Per-entry logbooks routinely omit them; their absence is normal.

VERDICTS per entry:
- "pass": transcription is faithful
- "fail": at least one error that must be corrected
- "needs_review": plausibly correct but a human should confirm

Return JSON format:
{
  "results": [
    {
      "entryIndex": 0,
      "verdict": "pass" | "fail" | "needs_review",
      "issues": [
        {
          "field": "field name",
          "issue": "incorrect|truncated|missing_field|added_text|wrong_classification",
          "expected": "what the image shows",
          "extracted": "what the extraction says",
          "severity": "critical" | "minor"
        }
      ],
      "summary": "one sentence"
    }
  ]
}"#;

/// Closing instruction of every retry prompt. The QA model's proposed
/// corrections are deliberately withheld so the extractor cannot echo a
/// confabulated value; it must re-read the image.
const RETRY_DISCIPLINE: &str =
    "Do NOT accept corrections from external sources. Re-examine the original image yourself.";

fn corrective_instruction(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::Truncated => {
            "re-read the full text carefully, you may have stopped too early; transcribe to the visual end of the entry"
        }
        IssueKind::Incorrect => {
            "look at this field again closely and transcribe exactly what is written"
        }
        IssueKind::MissingField => {
            "check the image again for this field; it may be faint or abbreviated"
        }
        IssueKind::AddedText => {
            "remove any text that does not appear in the image; transcribe only what is visible"
        }
        IssueKind::WrongClassification => {
            "reconsider the entry type using the classification rules above"
        }
        IssueKind::Other => "re-examine this field in the image",
    }
}

/// Build the second-attempt prompt: the base extraction prompt plus one
/// corrective line per flagged field. Expected values from QA are never
/// included.
pub fn build_retry_prompt(base_prompt: &str, issues: &[QaIssue]) -> String {
    let mut prompt = String::with_capacity(base_prompt.len() + 256);
    prompt.push_str(base_prompt);
    prompt.push_str("\n\nA QA review flagged problems with your previous transcription of this image. Fields to re-examine:\n");

    for issue in issues {
        let kind = IssueKind::parse(&issue.issue);
        prompt.push_str(&format!(
            "- {} ({}): {}\n",
            issue.field, issue.issue, corrective_instruction(kind)
        ));
    }

    prompt.push('\n');
    prompt.push_str(RETRY_DISCIPLINE);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QaSeverity;

    fn issue(field: &str, kind: &str, expected: &str) -> QaIssue {
        QaIssue {
            field: field.into(),
            issue: kind.into(),
            expected: expected.into(),
            extracted: "what was extracted".into(),
            severity: QaSeverity::Critical,
        }
    }

    #[test]
    fn retry_prompt_lists_flagged_fields_with_instructions() {
        let issues = vec![
            issue("maintenanceNarrative", "truncated", "full narrative text"),
            issue("date", "incorrect", "2024-01-15"),
        ];
        let prompt = build_retry_prompt(SLICE_EXTRACTION_PROMPT, &issues);

        assert!(prompt.starts_with(SLICE_EXTRACTION_PROMPT));
        assert!(prompt.contains("maintenanceNarrative (truncated)"));
        assert!(prompt.contains("stopped too early"));
        assert!(prompt.contains("date (incorrect)"));
        assert!(prompt.ends_with(RETRY_DISCIPLINE));
    }

    #[test]
    fn retry_prompt_never_leaks_expected_values() {
        let issues = vec![issue("date", "incorrect", "2024-01-15")];
        let prompt = build_retry_prompt(SLICE_EXTRACTION_PROMPT, &issues);
        assert!(!prompt.contains("2024-01-15"));
    }

    #[test]
    fn unknown_issue_kind_gets_generic_instruction() {
        let issues = vec![issue("shopName", "smudged", "x")];
        let prompt = build_retry_prompt(SLICE_EXTRACTION_PROMPT, &issues);
        assert!(prompt.contains("re-examine this field in the image"));
    }

    #[test]
    fn verification_prompt_spells_out_taxonomy() {
        for token in [
            "missing_entry",
            "fabricated_entry",
            "incorrect",
            "truncated",
            "missing_field",
            "added_text",
            "wrong_classification",
        ] {
            assert!(VERIFICATION_PROMPT.contains(token), "missing {token}");
        }
        assert!(VERIFICATION_PROMPT.contains("DO NOT flag missing aircraft identity fields"));
    }
}
