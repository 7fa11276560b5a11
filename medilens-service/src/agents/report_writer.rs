use async_trait::async_trait;
use chrono::Utc;
use medilens_flow::{
    ContextSnippet, DiagnosticReport, DiagnosticSession, ReportSection, Result, Stage, Task,
    TaskResult, VisualFindings,
};
use tracing::info;

use super::sections::{lines_of, split_sections};

const DEFAULT_RECOMMENDATION: &str = "Clinical correlation is recommended. Review these findings \
with the referring physician and compare with prior imaging where available.";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Part {
    Recommendations,
    Other,
}

fn classify(label: &str) -> Option<Part> {
    const RECOMMENDATION_MARKERS: &[&str] =
        &["RECOMMEND", "NEXT STEP", "FOLLOW", "SAFETY", "FURTHER TEST", "ADDITIONAL TEST"];
    const OTHER_MARKERS: &[&str] = &[
        "IMPRESSION",
        "DIFFERENTIAL",
        "JUSTIFICATION",
        "REASONING",
        "RISK",
        "MISSED",
        "ALTERNATIVE",
        "SUGGESTION",
        "FINDINGS",
    ];

    if RECOMMENDATION_MARKERS.iter().any(|marker| label.contains(marker)) {
        Some(Part::Recommendations)
    } else if OTHER_MARKERS.iter().any(|marker| label.contains(marker)) {
        Some(Part::Other)
    } else {
        None
    }
}

/// Assembles the final report from everything earlier stages recorded
pub struct ReportWriterAgent;

#[async_trait]
impl Task for ReportWriterAgent {
    fn stage(&self) -> Stage {
        Stage::ReportWriting
    }

    async fn run(&self, session: &mut DiagnosticSession) -> Result<TaskResult> {
        info!(session_id = %session.id(), "Compiling diagnostic report");

        let report = compile_report(session)?;
        let section_count = report.sections.len();
        session.record_report(report)?;

        info!(sections = section_count, "Diagnostic report ready");
        Ok(TaskResult::finish(format!(
            "Report compiled with {} sections",
            section_count
        )))
    }
}

fn compile_report(session: &DiagnosticSession) -> Result<DiagnosticReport> {
    let findings = session.require_visual_findings()?;
    let hypothesis = session.require_hypothesis()?;
    let critique = session.require_critique()?;

    let mut sections = vec![ReportSection {
        title: DiagnosticReport::IMAGING_FINDINGS.to_string(),
        body: imaging_findings(findings),
    }];

    if let Some(snippets) = session.retrieved_context().filter(|s| !s.is_empty()) {
        sections.push(ReportSection {
            title: DiagnosticReport::CLINICAL_CONTEXT.to_string(),
            body: clinical_context(snippets),
        });
    }

    sections.push(ReportSection {
        title: DiagnosticReport::DIAGNOSTIC_IMPRESSION.to_string(),
        body: hypothesis.trim().to_string(),
    });
    sections.push(ReportSection {
        title: DiagnosticReport::RISKS.to_string(),
        body: critique.trim().to_string(),
    });
    sections.push(ReportSection {
        title: DiagnosticReport::RECOMMENDATIONS.to_string(),
        body: recommendations(hypothesis, critique),
    });

    Ok(DiagnosticReport {
        session_id: session.id().to_string(),
        generated_at: Utc::now(),
        query: session.query().to_string(),
        sections,
    })
}

fn imaging_findings(findings: &VisualFindings) -> String {
    let structured = &findings.structured;
    let mut body = format!(
        "- **Modality:** {}\n- **Region:** {}\n- **Image quality:** {}\n- **Analyzer confidence:** {:.0}%\n",
        structured.modality,
        structured.anatomical_region,
        structured.image_quality,
        structured.confidence * 100.0
    );

    if !structured.key_findings.is_empty() {
        body.push_str("\n**Key findings:**\n");
        for finding in &structured.key_findings {
            body.push_str(&format!("- {}\n", finding));
        }
    }

    body.push('\n');
    body.push_str(findings.text.trim());
    body
}

fn clinical_context(snippets: &[ContextSnippet]) -> String {
    snippets
        .iter()
        .map(|snippet| {
            format!(
                "- **{}** (relevance {:.2}): {}",
                snippet.source,
                snippet.relevance,
                snippet.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Recommendation and follow-up parts of the hypothesis and the critique, in that order
fn recommendations(hypothesis: &str, critique: &str) -> String {
    let parts: Vec<String> = [hypothesis, critique]
        .iter()
        .map(|text| lines_of(&split_sections(text, classify), Part::Recommendations).join("\n"))
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        DEFAULT_RECOMMENDATION.to_string()
    } else {
        parts.join("\n\n")
    }
}
