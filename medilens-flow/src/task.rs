use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::Result, session::DiagnosticSession, session::PipelineState};

/// The fixed set of pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ImageAnalysis,
    Retrieval,
    Reasoning,
    Critique,
    ReportWriting,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::ImageAnalysis,
        Stage::Retrieval,
        Stage::Reasoning,
        Stage::Critique,
        Stage::ReportWriting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ImageAnalysis => "image_analysis",
            Stage::Retrieval => "retrieval",
            Stage::Reasoning => "reasoning",
            Stage::Critique => "critique",
            Stage::ReportWriting => "report_writing",
        }
    }

    /// State the session enters once this stage has completed
    pub fn completed_state(&self) -> PipelineState {
        match self {
            Stage::ImageAnalysis => PipelineState::ImageAnalyzed,
            Stage::Retrieval => PipelineState::ContextRetrieved,
            Stage::Reasoning => PipelineState::HypothesisFormed,
            Stage::Critique => PipelineState::Critiqued,
            Stage::ReportWriting => PipelineState::ReportReady,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Short human-readable note on what the task produced
    pub status_message: Option<String>,
    /// Next action to take
    pub next_action: NextAction,
}

impl TaskResult {
    pub fn new(status_message: Option<String>, next_action: NextAction) -> Self {
        Self {
            status_message,
            next_action,
        }
    }

    pub fn proceed(status_message: impl Into<String>) -> Self {
        Self::new(Some(status_message.into()), NextAction::Continue)
    }

    pub fn finish(status_message: impl Into<String>) -> Self {
        Self::new(Some(status_message.into()), NextAction::End)
    }
}

/// Defines what should happen after a task completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// Follow the outgoing edge of the current stage and run the next task immediately
    Continue,
    /// Stop the graph execution after this task
    End,
}

/// Core trait that every pipeline stage implements
#[async_trait]
pub trait Task: Send + Sync {
    /// Stage this task fills in
    fn stage(&self) -> Stage;

    /// Read upstream fields from the session and write this stage's field
    async fn run(&self, session: &mut DiagnosticSession) -> Result<TaskResult>;
}
