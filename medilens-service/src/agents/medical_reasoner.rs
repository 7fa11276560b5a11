use std::sync::Arc;

use async_trait::async_trait;
use medilens_flow::{DiagnosticSession, GraphError, Result, Stage, Task, TaskResult};
use tracing::{error, info};

use super::{format_context, format_findings};
use crate::llm::TextModel;

const PREAMBLE: &str = "You are an experienced diagnostic radiologist. You reason carefully \
from imaging evidence and clinical context to a diagnostic hypothesis, and you never invent \
findings that are not described.";

/// Turns findings and retrieved context into a draft diagnostic hypothesis
pub struct MedicalReasonerAgent {
    model: Arc<dyn TextModel>,
}

impl MedicalReasonerAgent {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Task for MedicalReasonerAgent {
    fn stage(&self) -> Stage {
        Stage::Reasoning
    }

    async fn run(&self, session: &mut DiagnosticSession) -> Result<TaskResult> {
        info!(session_id = %session.id(), model = self.model.name(), "Starting diagnostic reasoning");

        let findings = session.require_visual_findings()?;
        let prompt = build_reasoning_prompt(
            session.query(),
            &format_findings(findings),
            &format_context(session.retrieved_context()),
        );

        let hypothesis = match self.model.generate(PREAMBLE, &prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                return Err(GraphError::external(
                    Stage::Reasoning,
                    "text model returned an empty hypothesis",
                ));
            }
            Err(e) => {
                error!("Diagnostic reasoning failed: {:#}", e);
                return Err(GraphError::external(Stage::Reasoning, format!("{:#}", e)));
            }
        };

        session.record_hypothesis(hypothesis)?;

        info!("Diagnostic hypothesis formed");
        Ok(TaskResult::proceed("Diagnostic hypothesis formed"))
    }
}

fn build_reasoning_prompt(query: &str, findings: &str, context: &str) -> String {
    format!(
        "Based on the imaging findings and the medical context below, provide a diagnostic hypothesis.

CLINICAL QUESTION:
{}

IMAGING FINDINGS:
{}

MEDICAL CONTEXT:
{}

Structure your answer with these headings:
1. Primary Diagnostic Impression
2. Differential Diagnoses (at least two, most likely first)
3. Justification (tie each point to a finding or context item)
4. Recommended Tests or Next Steps",
        query, findings, context
    )
}
