pub mod image_analyzer;
pub mod medical_reasoner;
pub mod report_writer;
pub mod retriever;
pub mod risk_critic;
pub mod sections;

pub use image_analyzer::ImageAnalyzerAgent;
pub use medical_reasoner::MedicalReasonerAgent;
pub use report_writer::ReportWriterAgent;
pub use retriever::RetrieverAgent;
pub use risk_critic::RiskCriticAgent;

use medilens_flow::{ContextSnippet, VisualFindings};

const NO_CONTEXT: &str = "No additional context provided.";

/// Structured findings followed by the full analysis, as fed to the text models
pub(crate) fn format_findings(findings: &VisualFindings) -> String {
    let structured = &findings.structured;
    let list = |items: &[String]| {
        if items.is_empty() {
            "none reported".to_string()
        } else {
            items.join("; ")
        }
    };

    format!(
        "Modality: {}\nAnatomical region: {}\nKey findings: {}\nNormal structures: {}\n\
         Image quality: {}\nAnalyzer confidence: {:.0}%\nDifferentials considered: {}\n\n\
         Full imaging analysis:\n{}",
        structured.modality,
        structured.anatomical_region,
        list(&structured.key_findings),
        list(&structured.normal_structures),
        structured.image_quality,
        structured.confidence * 100.0,
        list(&structured.differential_diagnoses),
        findings.text.trim()
    )
}

pub(crate) fn format_context(snippets: Option<&[ContextSnippet]>) -> String {
    match snippets {
        Some(snippets) if !snippets.is_empty() => snippets
            .iter()
            .map(|snippet| format!("[{}] {}", snippet.source, snippet.text.trim()))
            .collect::<Vec<_>>()
            .join("\n---\n"),
        _ => NO_CONTEXT.to_string(),
    }
}
