use thiserror::Error;

use crate::task::Stage;

/// Errors raised while building or executing the diagnostic graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// A hosted model or retrieval backend call failed
    #[error("{stage} stage failed calling an external service: {message}")]
    ExternalService { stage: Stage, message: String },

    /// Missing or malformed request input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Document generation failed
    #[error("report rendering failed: {0}")]
    Render(String),

    #[error("session field `{0}` has already been written")]
    FieldAlreadyWritten(&'static str),

    #[error("session field `{0}` has not been written yet")]
    MissingField(&'static str),

    #[error("no task registered for stage {0}")]
    TaskNotFound(Stage),

    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}

impl GraphError {
    pub fn external(stage: Stage, error: impl std::fmt::Display) -> Self {
        Self::ExternalService {
            stage,
            message: error.to_string(),
        }
    }

    /// Stage the error is attributed to, when known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::ExternalService { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
