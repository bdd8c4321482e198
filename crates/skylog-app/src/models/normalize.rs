//! Vocabulary normalization applied to extracted entries before persistence.
//!
//! The vision model is prompted with a closed vocabulary but routinely drifts
//! (`"serviced"`, `"annual"` as an entry type, etc.). These rules are the
//! single place the drift is repaired; the persistence layer only ever sees
//! the closed enums.

use std::str::FromStr;

use strum::{AsRefStr, Display, EnumString};

use super::entry::ExtractedEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EntryType {
    Maintenance,
    Inspection,
    AdCompliance,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum InspectionType {
    Annual,
    #[strum(serialize = "100hr")]
    Hundred,
    #[strum(serialize = "50hr")]
    Fifty,
    Progressive,
    AltimeterStatic,
    Transponder,
    Elt,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PartsActionKind {
    Installed,
    Removed,
    Replaced,
    Repaired,
    Inspected,
    Overhauled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ComplianceMethod {
    Inspection,
    Replacement,
    Modification,
    TerminatingAction,
    Recurring,
    NotApplicable,
    Other,
}

/// Legacy entry-type aliases produced by earlier prompt revisions. They name
/// an inspection subtype, so they are rewritten to `entry_type = inspection`
/// with the mapped `inspection_type`.
fn legacy_inspection_alias(entry_type: &str) -> Option<InspectionType> {
    match entry_type {
        "annual" => Some(InspectionType::Annual),
        "100hr" => Some(InspectionType::Hundred),
        "progressive" => Some(InspectionType::Progressive),
        "altimeter_check" => Some(InspectionType::AltimeterStatic),
        "transponder_check" => Some(InspectionType::Transponder),
        _ => None,
    }
}

/// Rewrite `entry_type`/`inspection_type` into the closed vocabulary.
///
/// Empty → `maintenance`; legacy inspection aliases → `inspection` with the
/// mapped subtype; `inspection` without a subtype → subtype `other`; anything
/// unknown → `other`.
pub fn normalize_entry_type(entry: &mut ExtractedEntry) {
    if entry.entry_type.is_empty() {
        entry.entry_type = EntryType::Maintenance.to_string();
    }

    if let Some(subtype) = legacy_inspection_alias(&entry.entry_type) {
        entry.inspection_type = subtype.to_string();
        entry.entry_type = EntryType::Inspection.to_string();
    } else if entry.entry_type == EntryType::Inspection.as_ref() && entry.inspection_type.is_empty()
    {
        entry.inspection_type = InspectionType::Other.to_string();
    }

    if EntryType::from_str(&entry.entry_type).is_err() {
        entry.entry_type = EntryType::Other.to_string();
    }
}

/// Map a raw parts action to the closed set, going through the synonym table
/// for common verbs; anything else defaults to `installed`.
pub fn normalize_action(raw: &str) -> PartsActionKind {
    if let Ok(kind) = PartsActionKind::from_str(raw) {
        return kind;
    }
    match raw {
        "reinstalled" | "applied" => PartsActionKind::Installed,
        "serviced" | "adjusted" | "cleaned" | "lubricated" => PartsActionKind::Repaired,
        "tested" | "calibrated" => PartsActionKind::Inspected,
        _ => PartsActionKind::Installed,
    }
}

/// Map a raw AD compliance method; empty stays absent, unknown becomes
/// `other`.
pub fn normalize_method(raw: &str) -> Option<ComplianceMethod> {
    if raw.is_empty() {
        return None;
    }
    Some(ComplianceMethod::from_str(raw).unwrap_or(ComplianceMethod::Other))
}

/// Map a raw inspection type; unknown becomes `other`.
pub fn normalize_inspection_type(raw: &str) -> InspectionType {
    InspectionType::from_str(raw).unwrap_or(InspectionType::Other)
}
