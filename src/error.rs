use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Misconfigured assessment, threshold or outcome reference.
    #[error("{subject}: {message}")]
    Configuration { subject: String, message: String },
    /// Collaborator data that cannot be turned into a snapshot.
    #[error("{0}")]
    InputShape(String),
}

impl EngineError {
    pub fn config(subject: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Configuration {
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        EngineError::InputShape(message.into())
    }

    /// Wire code used by the sidecar error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Configuration { .. } => "bad_config",
            EngineError::InputShape(_) => "bad_input",
        }
    }
}

/// A (student, assessment) pair that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringIssue {
    pub student_id: String,
    pub assessment_id: String,
    pub code: String,
    pub message: String,
}

impl ScoringIssue {
    pub fn new(
        student_id: &str,
        assessment_id: &str,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.to_string(),
            assessment_id: assessment_id.to_string(),
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn from_error(student_id: &str, assessment_id: &str, e: &EngineError) -> Self {
        Self::new(student_id, assessment_id, e.code(), e.to_string())
    }
}
