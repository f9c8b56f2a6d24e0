//! Processing-status state machine

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Processing status shared by every status-tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Completed | ProcessingStatus::Failed | ProcessingStatus::Cancelled
        )
    }

    /// States from which `self` may be entered
    pub fn allowed_sources(&self) -> &'static [ProcessingStatus] {
        match self {
            ProcessingStatus::Pending => &[],
            ProcessingStatus::Processing => &[ProcessingStatus::Pending],
            ProcessingStatus::Completed
            | ProcessingStatus::Failed
            | ProcessingStatus::Cancelled => {
                &[ProcessingStatus::Pending, ProcessingStatus::Processing]
            }
        }
    }

    pub fn can_transition_to(&self, target: ProcessingStatus) -> bool {
        target.allowed_sources().contains(self)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            "cancelled" => Ok(ProcessingStatus::Cancelled),
            _ => Err(Error::Validation(format!("Unknown status: {}", s))),
        }
    }
}

/// Status columns carried by status-tracked tables
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StatusFields {
    pub status: ProcessingStatus,
    pub status_message: String,
    pub processing_started_at: Option<String>,
    pub processing_completed_at: Option<String>,
}

impl Default for StatusFields {
    fn default() -> Self {
        Self {
            status: ProcessingStatus::Pending,
            status_message: String::new(),
            processing_started_at: None,
            processing_completed_at: None,
        }
    }
}

/// Capability of records whose processing state is driven through
/// `Database::mark_processing` / `mark_completed` / `mark_failed` / `mark_cancelled`
pub trait StatusTrackable {
    /// Table holding the status columns
    const TABLE: &'static str;

    /// Human-readable entity name used in errors and logs
    const ENTITY: &'static str;

    fn id(&self) -> &str;

    fn status_fields(&self) -> &StatusFields;

    /// Error reported when no row with `id` exists
    fn not_found(id: &str) -> Error;

    fn status(&self) -> ProcessingStatus {
        self.status_fields().status
    }

    fn is_processing(&self) -> bool {
        self.status() == ProcessingStatus::Processing
    }

    fn is_completed(&self) -> bool {
        self.status() == ProcessingStatus::Completed
    }

    fn has_failed(&self) -> bool {
        self.status() == ProcessingStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use ProcessingStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Failed));
    }

    #[test]
    fn test_no_backward_or_terminal_exits() {
        use ProcessingStatus::*;
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for target in [Pending, Processing, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn test_status_parse_display() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
            ProcessingStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<ProcessingStatus>().unwrap(), status);
        }
        assert!("done".parse::<ProcessingStatus>().is_err());
    }
}
