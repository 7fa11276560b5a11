use medilens_flow::{
    DiagnosticSession, ExecutionResult, ExecutionStatus, ReportSection, Stage, StructuredFindings,
};
use serde::{Deserialize, Serialize};

/// Body returned by `POST /diagnose`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnoseResponse {
    /// `completed` when a report was produced, otherwise `halted`
    pub status: String,
    pub session_id: String,
    pub state: String,
    /// The report rendered as Markdown
    pub report: Option<String>,
    pub sections: Vec<ReportSection>,
    pub findings: Option<StructuredFindings>,
    pub stages: Vec<Stage>,
    pub saved_path: Option<String>,
}

impl DiagnoseResponse {
    pub fn from_session(
        session: &DiagnosticSession,
        result: &ExecutionResult,
        saved_path: Option<String>,
    ) -> Self {
        let status = match result.status {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Halted { .. } => "halted",
        };
        let report = session.report();

        Self {
            status: status.to_string(),
            session_id: session.id().to_string(),
            state: session.state().label().to_string(),
            report: report.map(|report| report.to_markdown()),
            sections: report
                .map(|report| report.sections.clone())
                .unwrap_or_default(),
            findings: session
                .visual_findings()
                .map(|findings| findings.structured.clone()),
            stages: result.stages.clone(),
            saved_path,
        }
    }
}

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
