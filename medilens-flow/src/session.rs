use std::fmt;
use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{GraphError, Result},
    models::{ContextSnippet, DiagnosticReport, VisualFindings},
    task::Stage,
};

/// Smallest accepted width or height, in pixels
pub const MIN_IMAGE_DIMENSION: u32 = 100;
/// Largest accepted width or height, in pixels
pub const MAX_IMAGE_DIMENSION: u32 = 4096;

/// A validated medical image payload
#[derive(Clone, Serialize)]
pub struct ImageInput {
    #[serde(skip)]
    bytes: Vec<u8>,
    pub filename: Option<String>,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
}

impl ImageInput {
    /// Validate raw upload bytes: they must fully decode as PNG or JPEG
    /// with both sides within [`MIN_IMAGE_DIMENSION`]..=[`MAX_IMAGE_DIMENSION`].
    pub fn from_bytes(bytes: Vec<u8>, filename: Option<String>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(GraphError::Validation("image payload is empty".to_string()));
        }

        let reader = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| GraphError::Validation(format!("failed to read image: {}", e)))?;

        let format = match reader.format() {
            Some(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => format,
            Some(other) => {
                return Err(GraphError::Validation(format!(
                    "unsupported image format {:?} (expected PNG or JPEG)",
                    other
                )));
            }
            None => {
                return Err(GraphError::Validation(
                    "unrecognised image format".to_string(),
                ));
            }
        };

        let decoded = reader
            .decode()
            .map_err(|e| GraphError::Validation(format!("malformed image: {}", e)))?;
        let (width, height) = (decoded.width(), decoded.height());

        let in_range = |side: u32| (MIN_IMAGE_DIMENSION..=MAX_IMAGE_DIMENSION).contains(&side);
        if !in_range(width) || !in_range(height) {
            return Err(GraphError::Validation(format!(
                "image is {}x{}, each side must be between {} and {} pixels",
                width, height, MIN_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION
            )));
        }

        Ok(Self {
            bytes,
            filename,
            media_type: format.to_mime_type().to_string(),
            width,
            height,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64 `data:` URL accepted by vision chat APIs
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInput")
            .field("filename", &self.filename)
            .field("media_type", &self.media_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Position of a session in the linear pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    ImageAnalyzed,
    ContextRetrieved,
    HypothesisFormed,
    Critiqued,
    ReportReady,
    Failed { stage: Stage, reason: String },
}

impl PipelineState {
    fn rank(&self) -> Option<u8> {
        match self {
            PipelineState::Init => Some(0),
            PipelineState::ImageAnalyzed => Some(1),
            PipelineState::ContextRetrieved => Some(2),
            PipelineState::HypothesisFormed => Some(3),
            PipelineState::Critiqued => Some(4),
            PipelineState::ReportReady => Some(5),
            PipelineState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::ReportReady | PipelineState::Failed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::ImageAnalyzed => "image_analyzed",
            PipelineState::ContextRetrieved => "context_retrieved",
            PipelineState::HypothesisFormed => "hypothesis_formed",
            PipelineState::Critiqued => "critiqued",
            PipelineState::ReportReady => "report_ready",
            PipelineState::Failed { .. } => "failed",
        }
    }
}

/// One executed stage in the session's audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
}

/// State threaded through the pipeline for a single request.
///
/// Every derived field is written at most once, by the stage that owns it,
/// and is read-only for the stages downstream of it.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticSession {
    id: String,
    created_at: DateTime<Utc>,
    image: ImageInput,
    query: String,
    use_context: bool,
    state: PipelineState,
    visual_findings: Option<VisualFindings>,
    retrieved_context: Option<Vec<ContextSnippet>>,
    hypothesis: Option<String>,
    critique: Option<String>,
    report: Option<DiagnosticReport>,
    history: Vec<StageRecord>,
}

impl DiagnosticSession {
    pub fn new(image: ImageInput, query: impl Into<String>, use_context: bool) -> Result<Self> {
        let query = query.into().trim().to_string();
        if query.is_empty() {
            return Err(GraphError::Validation(
                "clinical query is required".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            image,
            query,
            use_context,
            state: PipelineState::Init,
            visual_findings: None,
            retrieved_context: None,
            hypothesis: None,
            critique: None,
            report: None,
            history: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn image(&self) -> &ImageInput {
        &self.image
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn use_context(&self) -> bool {
        self.use_context
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    /// Stages that completed successfully, in execution order
    pub fn completed_stages(&self) -> Vec<Stage> {
        self.history
            .iter()
            .filter(|record| record.succeeded)
            .map(|record| record.stage)
            .collect()
    }

    pub fn visual_findings(&self) -> Option<&VisualFindings> {
        self.visual_findings.as_ref()
    }

    pub fn retrieved_context(&self) -> Option<&[ContextSnippet]> {
        self.retrieved_context.as_deref()
    }

    pub fn hypothesis(&self) -> Option<&str> {
        self.hypothesis.as_deref()
    }

    pub fn critique(&self) -> Option<&str> {
        self.critique.as_deref()
    }

    pub fn report(&self) -> Option<&DiagnosticReport> {
        self.report.as_ref()
    }

    pub fn into_report(self) -> Option<DiagnosticReport> {
        self.report
    }

    pub fn require_visual_findings(&self) -> Result<&VisualFindings> {
        self.visual_findings
            .as_ref()
            .ok_or(GraphError::MissingField("visual_findings"))
    }

    pub fn require_hypothesis(&self) -> Result<&str> {
        self.hypothesis
            .as_deref()
            .ok_or(GraphError::MissingField("hypothesis"))
    }

    pub fn require_critique(&self) -> Result<&str> {
        self.critique
            .as_deref()
            .ok_or(GraphError::MissingField("critique"))
    }

    pub fn record_visual_findings(&mut self, findings: VisualFindings) -> Result<()> {
        write_once(&mut self.visual_findings, findings, "visual_findings")
    }

    pub fn record_retrieved_context(&mut self, snippets: Vec<ContextSnippet>) -> Result<()> {
        write_once(&mut self.retrieved_context, snippets, "retrieved_context")
    }

    pub fn record_hypothesis(&mut self, hypothesis: impl Into<String>) -> Result<()> {
        write_once(&mut self.hypothesis, hypothesis.into(), "hypothesis")
    }

    pub fn record_critique(&mut self, critique: impl Into<String>) -> Result<()> {
        write_once(&mut self.critique, critique.into(), "critique")
    }

    pub fn record_report(&mut self, report: DiagnosticReport) -> Result<()> {
        write_once(&mut self.report, report, "report")
    }

    pub(crate) fn complete_stage(
        &mut self,
        stage: Stage,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let next = stage.completed_state();
        let advances = match (self.state.rank(), next.rank()) {
            (Some(current), Some(next)) => next > current,
            _ => false,
        };
        if !advances {
            return Err(GraphError::InvalidGraph(format!(
                "stage {} cannot move session from {} to {}",
                stage,
                self.state.label(),
                next.label()
            )));
        }

        self.history.push(StageRecord {
            stage,
            started_at,
            finished_at: Utc::now(),
            succeeded: true,
        });
        self.state = next;
        Ok(())
    }

    pub(crate) fn fail_stage(&mut self, stage: Stage, started_at: DateTime<Utc>, reason: String) {
        self.history.push(StageRecord {
            stage,
            started_at,
            finished_at: Utc::now(),
            succeeded: false,
        });
        self.state = PipelineState::Failed { stage, reason };
    }
}

fn write_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<()> {
    if slot.is_some() {
        return Err(GraphError::FieldAlreadyWritten(field));
    }
    *slot = Some(value);
    Ok(())
}
