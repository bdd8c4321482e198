//! Aircraft identity reconciliation.
//!
//! Extracted identity fields are compared against the authoritative record
//! for the batch's aircraft; a mismatch flags the entry for human review
//! rather than rejecting it.

use crate::models::ExtractedEntry;
use crate::services::store::AircraftIdentity;

pub const IDENTITY_MISMATCH_TAG: &str = "aircraft_identity_mismatch";

/// Uppercase with spaces and hyphens stripped. Idempotent.
pub fn normalize(value: &str) -> String {
    value
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect()
}

/// Symmetric containment match on the normalized strings: serial plates and
/// registry records abbreviate differently ("CESSNA 172S" vs "172S"), so
/// either side containing the other counts.
pub fn fuzzy_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a.contains(&b) || b.contains(&a)
}

/// Compare the entry's extracted identity to the authoritative record and
/// flag the entry on mismatch.
///
/// No check happens when either serial number is absent. Make and model are
/// soft-matched and skipped when either side is empty; a mismatch fires only
/// when the serial differs, or both make and model disagree.
pub fn check_aircraft_identity(entry: &mut ExtractedEntry, expected: &AircraftIdentity) {
    if expected.serial_number.is_empty() || entry.aircraft_serial.is_empty() {
        return;
    }

    let serial_match = normalize(&entry.aircraft_serial) == normalize(&expected.serial_number);

    let make_match = entry.aircraft_make.is_empty()
        || expected.make.is_empty()
        || fuzzy_match(&entry.aircraft_make, &expected.make);
    let model_match = entry.aircraft_model.is_empty()
        || expected.model.is_empty()
        || fuzzy_match(&entry.aircraft_model, &expected.model);

    if serial_match && (make_match || model_match) {
        return;
    }

    let mut reasons = Vec::new();
    if !serial_match {
        reasons.push(format!(
            "serial {:?} != {:?}",
            entry.aircraft_serial, expected.serial_number
        ));
    }
    if !make_match {
        reasons.push(format!(
            "make {:?} !~ {:?}",
            entry.aircraft_make, expected.make
        ));
    }
    if !model_match {
        reasons.push(format!(
            "model {:?} !~ {:?}",
            entry.aircraft_model, expected.model
        ));
    }

    let note = format!("Aircraft identity mismatch: {}", reasons.join(", "));
    tracing::warn!(registration = %expected.registration, %note, "identity reconciliation failed");

    entry.needs_review = true;
    entry.extraction_notes.push_str(&note);
    entry.missing_data.push(IDENTITY_MISMATCH_TAG.to_string());
}
