use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// How a batch was uploaded: one PDF, or a set of page images.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UploadType {
    Pdf,
    MultiImage,
}

/// Lifecycle of an upload batch. Terminal states are `Completed`,
/// `CompletedWithErrors`, and `Failed`; once reached, a batch never returns
/// to `Processing`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::CompletedWithErrors | BatchStatus::Failed
        )
    }
}

/// Lifecycle of a single page within a batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

/// Human review state of a persisted entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Corrected,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn statuses_round_trip_snake_case() {
        assert_eq!(BatchStatus::CompletedWithErrors.as_ref(), "completed_with_errors");
        assert_eq!(
            BatchStatus::from_str("completed_with_errors").expect("parse"),
            BatchStatus::CompletedWithErrors
        );
        assert_eq!(UploadType::MultiImage.as_ref(), "multi_image");
        assert_eq!(ExtractionStatus::Skipped.as_ref(), "skipped");
    }

    #[test]
    fn terminal_states() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::CompletedWithErrors.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(!BatchStatus::Pending.is_terminal());
        assert!(!BatchStatus::Processing.is_terminal());
    }
}
