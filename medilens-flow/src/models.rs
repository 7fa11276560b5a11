use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output of the image analysis stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualFindings {
    /// Raw text returned by the vision model
    pub text: String,
    pub structured: StructuredFindings,
}

/// Key facts pulled out of the vision model's free-text analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFindings {
    pub modality: String,
    pub anatomical_region: String,
    pub key_findings: Vec<String>,
    pub normal_structures: Vec<String>,
    pub image_quality: String,
    /// Normalised to 0.0..=1.0
    pub confidence: f32,
    pub differential_diagnoses: Vec<String>,
}

impl Default for StructuredFindings {
    fn default() -> Self {
        Self {
            modality: "unknown".to_string(),
            anatomical_region: "unspecified".to_string(),
            key_findings: Vec::new(),
            normal_structures: Vec::new(),
            image_quality: "not assessed".to_string(),
            confidence: 0.7,
            differential_diagnoses: Vec::new(),
        }
    }
}

/// A retrieved knowledge snippet and its relevance to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub source: String,
    pub text: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub body: String,
}

/// Final structured report assembled from every upstream stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    pub query: String,
    pub sections: Vec<ReportSection>,
}

impl DiagnosticReport {
    pub const IMAGING_FINDINGS: &'static str = "Imaging Findings";
    pub const CLINICAL_CONTEXT: &'static str = "Clinical Context";
    pub const DIAGNOSTIC_IMPRESSION: &'static str = "Diagnostic Impression";
    pub const RISKS: &'static str = "Risks and Differentials";
    pub const RECOMMENDATIONS: &'static str = "Recommendations";

    pub fn section(&self, title: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|section| section.title == title)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# MediLens Diagnostic Report\n\n");
        out.push_str(&format!("- **Session:** {}\n", self.session_id));
        out.push_str(&format!(
            "- **Generated:** {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        ));
        out.push_str(&format!("- **Clinical question:** {}\n", self.query));

        for section in &self.sections {
            out.push_str(&format!("\n## {}\n\n{}\n", section.title, section.body.trim()));
        }
        out
    }
}
