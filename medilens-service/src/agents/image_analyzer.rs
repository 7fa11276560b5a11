use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use medilens_flow::{
    DiagnosticSession, GraphError, Result, Stage, StructuredFindings, Task, TaskResult,
    VisualFindings,
};
use regex::Regex;
use tracing::{error, info};

use super::sections::{clean_item, lines_of, split_sections};
use crate::llm::VisionModel;

const MAX_KEY_FINDINGS: usize = 5;
const MAX_DIFFERENTIALS: usize = 3;
const MIN_DIFFERENTIAL_LEN: usize = 10;

const ANALYSIS_PROMPT: &str = "As an expert medical imaging specialist, analyze this medical image systematically.

VISUAL FINDINGS
- Identify the imaging modality (X-ray, CT, MRI, ultrasound, mammography, PET, nuclear)
- Identify the anatomical region and patient positioning
- Describe normal anatomical structures

ABNORMAL FINDINGS
- List each abnormal finding on its own line with location, size and characteristics

MORPHOLOGICAL ASSESSMENT
- Shape, margins, density or signal characteristics of any lesion
- Relationship to surrounding structures

DIFFERENTIAL DIAGNOSIS
- The most likely diagnoses based on the imaging findings, one per line

TECHNICAL QUALITY
- Rate the image quality (excellent, good, fair or poor) and note any limitations

RECOMMENDATIONS
- Further imaging or clinical steps, if any

CONFIDENCE
- Your confidence in this analysis as N/10

Use exactly these headings. Be specific and use standard radiological terminology.";

static CONFIDENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"confidence[:\s]+(\d+)\s*(?:/\s*10)?",
        r"certainty[:\s]+(\d+)",
        r"confidence.*?(\d+).*?(?:out of|/)\s*10",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid regex"))
    .collect()
});

static MODALITIES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("x-ray", r"\b(x-?rays?|radiographs?|radiography)\b"),
        ("ct", r"\b(ct|computed tomography)\b"),
        ("mri", r"\b(mri|magnetic resonance)\b"),
        ("ultrasound", r"\b(ultrasound|sonograph\w*)\b"),
        ("mammography", r"\bmammogra\w*\b"),
        ("pet", r"\bpet\b"),
        ("nuclear", r"\bnuclear\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("Invalid regex")))
    .collect()
});

static REGIONS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("chest", r"\b(chest|thora\w*)\b"),
        ("abdomen", r"\babdom\w*\b"),
        ("pelvis", r"\bpelvi\w*\b"),
        ("head", r"\b(head|skull|brain|cranial)\b"),
        ("neck", r"\bneck\b"),
        ("spine", r"\b(spine|spinal|vertebra\w*)\b"),
        ("extremity", r"\b(extremit\w*|arm|leg|hand|foot|knee|wrist|ankle)\b"),
        ("heart", r"\b(heart|cardiac)\b"),
        ("lung", r"\blungs?\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("Invalid regex")))
    .collect()
});

static NORMAL_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(normal|unremarkable|within normal limits|no evidence)\b")
        .expect("Invalid regex")
});

/// Quality levels in priority order, each with the wording that maps onto it
static QUALITY_LEVELS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("excellent", r"\b(excellent|optimal|high quality)\b"),
        ("good", r"\b(good|adequate|satisfactory)\b"),
        ("fair", r"\b(fair|moderate|acceptable)\b"),
        ("poor", r"\b(poor|suboptimal|limited|degraded)\b"),
    ]
    .into_iter()
    .map(|(level, pattern)| (level, Regex::new(pattern).expect("Invalid regex")))
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq)]
enum AnalysisSection {
    Visual,
    Abnormal,
    Morphology,
    Differential,
    Technical,
    Recommendations,
    Confidence,
}

fn classify(label: &str) -> Option<AnalysisSection> {
    use AnalysisSection::*;

    if label.contains("ABNORMAL") {
        Some(Abnormal)
    } else if label.contains("DIFFERENTIAL") || label.contains("IMPRESSION") {
        Some(Differential)
    } else if label.contains("MORPHOLOG") {
        Some(Morphology)
    } else if label.contains("TECHNICAL") || label.contains("QUALITY") {
        Some(Technical)
    } else if label.contains("RECOMMEND") {
        Some(Recommendations)
    } else if label.contains("CONFIDENCE") || label.contains("CERTAINTY") {
        Some(Confidence)
    } else if label.contains("FINDINGS") || label.contains("VISUAL") || label.contains("ANATOM") {
        Some(Visual)
    } else {
        None
    }
}

/// Runs the systematic imaging analysis prompt against the vision model
pub struct ImageAnalyzerAgent {
    vision: Arc<dyn VisionModel>,
}

impl ImageAnalyzerAgent {
    pub fn new(vision: Arc<dyn VisionModel>) -> Self {
        Self { vision }
    }
}

#[async_trait]
impl Task for ImageAnalyzerAgent {
    fn stage(&self) -> Stage {
        Stage::ImageAnalysis
    }

    async fn run(&self, session: &mut DiagnosticSession) -> Result<TaskResult> {
        info!(
            session_id = %session.id(),
            model = self.vision.name(),
            width = session.image().width,
            height = session.image().height,
            "Starting image analysis"
        );

        let prompt = build_analysis_prompt(session.query());
        let text = match self.vision.analyze(session.image(), &prompt).await {
            Ok(text) => text,
            Err(e) => {
                error!("Vision model call failed: {:#}", e);
                return Err(GraphError::external(Stage::ImageAnalysis, format!("{:#}", e)));
            }
        };

        if text.trim().is_empty() {
            return Err(GraphError::external(
                Stage::ImageAnalysis,
                "vision model returned an empty analysis",
            ));
        }

        let structured = parse_findings(&text);
        let status = format!(
            "Image analyzed: {} of {} ({} key findings)",
            structured.modality,
            structured.anatomical_region,
            structured.key_findings.len()
        );

        session.record_visual_findings(VisualFindings { text, structured })?;

        info!("Image analysis completed");
        Ok(TaskResult::proceed(status))
    }
}

pub fn build_analysis_prompt(query: &str) -> String {
    format!(
        "{}\n\nCLINICAL CONTEXT:\n{}\n\nFocus on findings relevant to this clinical question.",
        ANALYSIS_PROMPT,
        query.trim()
    )
}

/// Pull structured facts out of the free-text analysis. Fields that cannot be found keep
/// their [`StructuredFindings::default`] values.
pub fn parse_findings(text: &str) -> StructuredFindings {
    let sections = split_sections(text, classify);
    let mut findings = StructuredFindings::default();

    let visual = lines_of(&sections, AnalysisSection::Visual).join("\n");
    let search_space = if visual.is_empty() {
        text.to_lowercase()
    } else {
        visual.to_lowercase()
    };

    if let Some((name, _)) = MODALITIES.iter().find(|(_, re)| re.is_match(&search_space)) {
        findings.modality = name.to_string();
    }
    if let Some((name, _)) = REGIONS.iter().find(|(_, re)| re.is_match(&search_space)) {
        findings.anatomical_region = name.to_string();
    }

    findings.key_findings = lines_of(&sections, AnalysisSection::Abnormal)
        .into_iter()
        .map(clean_item)
        .filter(|item| !item.is_empty())
        .take(MAX_KEY_FINDINGS)
        .collect();

    findings.normal_structures = lines_of(&sections, AnalysisSection::Visual)
        .into_iter()
        .chain(lines_of(&sections, AnalysisSection::Morphology))
        .filter(|line| NORMAL_MARKERS.is_match(line))
        .map(clean_item)
        .filter(|item| !item.is_empty())
        .collect();

    let technical = lines_of(&sections, AnalysisSection::Technical)
        .join(" ")
        .to_lowercase();
    if let Some((level, _)) = QUALITY_LEVELS.iter().find(|(_, re)| re.is_match(&technical)) {
        findings.image_quality = level.to_string();
    }

    if let Some(confidence) = parse_confidence(text) {
        findings.confidence = confidence;
    }

    findings.differential_diagnoses = lines_of(&sections, AnalysisSection::Differential)
        .into_iter()
        .map(clean_item)
        .filter(|item| item.len() > MIN_DIFFERENTIAL_LEN)
        .take(MAX_DIFFERENTIALS)
        .collect();

    findings
}

/// Confidence ratings are given out of ten; the result is clamped to 0.0..=1.0
fn parse_confidence(text: &str) -> Option<f32> {
    let lowered = text.to_lowercase();
    CONFIDENCE_PATTERNS.iter().find_map(|re| {
        re.captures(&lowered)
            .and_then(|captures| captures.get(1))
            .and_then(|score| score.as_str().parse::<f32>().ok())
            .map(|score| (score / 10.0).clamp(0.0, 1.0))
    })
}
