use std::sync::Arc;

use async_trait::async_trait;
use medilens_flow::{DiagnosticSession, GraphError, Result, Stage, Task, TaskResult};
use tracing::{error, info};

use super::{format_context, format_findings};
use crate::llm::TextModel;

const PREAMBLE: &str = "You are a senior radiologist performing a second read. Your job is \
to find weaknesses in a colleague's diagnostic reasoning and to protect patient safety.";

/// Reviews the draft hypothesis for risks, missed diagnoses and uncertainty
pub struct RiskCriticAgent {
    model: Arc<dyn TextModel>,
}

impl RiskCriticAgent {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Task for RiskCriticAgent {
    fn stage(&self) -> Stage {
        Stage::Critique
    }

    async fn run(&self, session: &mut DiagnosticSession) -> Result<TaskResult> {
        info!(session_id = %session.id(), model = self.model.name(), "Starting risk review");

        let hypothesis = session.require_hypothesis()?;
        let findings = session.require_visual_findings()?;
        let prompt = build_critique_prompt(
            hypothesis,
            &format_findings(findings),
            &format_context(session.retrieved_context()),
        );

        let critique = match self.model.generate(PREAMBLE, &prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                return Err(GraphError::external(
                    Stage::Critique,
                    "text model returned an empty critique",
                ));
            }
            Err(e) => {
                error!("Risk review failed: {:#}", e);
                return Err(GraphError::external(Stage::Critique, format!("{:#}", e)));
            }
        };

        session.record_critique(critique)?;

        info!("Risk review completed");
        Ok(TaskResult::proceed("Hypothesis critiqued"))
    }
}

fn build_critique_prompt(hypothesis: &str, findings: &str, context: &str) -> String {
    format!(
        "Critically review the following diagnostic hypothesis.

DIAGNOSTIC HYPOTHESIS:
{}

IMAGING FINDINGS:
{}

MEDICAL CONTEXT:
{}

Structure your review with these headings:
1. Potential Risks or Missed Diagnoses
2. Alternative Interpretations
3. Suggestions for Improvement
4. Clinical Safety Considerations

Be specific and cite the findings you rely on.",
        hypothesis, findings, context
    )
}
