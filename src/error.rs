//! Engine error taxonomy

use thiserror::Error;

use crate::store::StoreError;
use crate::validation::ValidationReport;

/// Errors surfaced by the wizard engine.
///
/// Incomplete records are not errors; they are represented structurally by
/// the step status map. Stale responses are discarded internally and never
/// appear here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fetching the subject record failed; the navigator keeps its last
    /// known step and the caller may retry
    #[error("failed to fetch record for subject {subject_id}")]
    Fetch {
        subject_id: String,
        #[source]
        source: StoreError,
    },

    /// Submitting a step failed; the record and current step are unchanged
    #[error("failed to submit step {step_id} for subject {subject_id}")]
    Submit {
        subject_id: String,
        step_id: u32,
        #[source]
        source: StoreError,
    },

    /// The payload failed local validation; per-field codes in the report
    #[error("step {step_id} failed validation")]
    Validation {
        step_id: u32,
        report: ValidationReport,
    },

    /// A submission for the same step is still outstanding (single-flight)
    #[error("a submission for step {step_id} is already in flight")]
    SubmissionInFlight { step_id: u32 },

    /// The step id does not exist in the wizard schema
    #[error("wizard {wizard} has no step {step_id}")]
    UnknownStep { wizard: String, step_id: u32 },

    /// The wizard schema failed consistency validation
    #[error("invalid wizard schema {wizard}: {problems:?}")]
    InvalidSchema {
        wizard: String,
        problems: Vec<String>,
    },
}

impl EngineError {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Fetch { source, .. } | EngineError::Submit { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// The per-field validation report, when this is a validation failure
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            EngineError::Validation { report, .. } => Some(report),
            _ => None,
        }
    }
}
