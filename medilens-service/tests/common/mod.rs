#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use medilens_flow::{ContextSnippet, FlowRunner, ImageInput};
use medilens_service::{
    PipelineAgents, build_diagnostic_workflow,
    knowledge::KnowledgeChunk,
    llm::{TextModel, VisionModel},
    retrieval::{KeywordRetriever, Retriever},
};

pub const QUERY: &str = "any abnormalities?";

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::from_pixel(width, height, image::Rgb([40, 40, 40]))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Valid PNG header, garbage pixel data
pub fn corrupt_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = png_bytes(width, height);
    let tag = bytes
        .windows(4)
        .position(|window| window == b"IDAT")
        .unwrap();
    let len = u32::from_be_bytes(bytes[tag - 4..tag].try_into().unwrap()) as usize;
    bytes[tag + 4..tag + 4 + len].fill(0xAB);
    bytes
}

pub fn image(name: &str, width: u32, height: u32) -> ImageInput {
    ImageInput::from_bytes(png_bytes(width, height), Some(name.to_string())).unwrap()
}

/// Vision model whose analysis names the image it was shown (`IMG-<w>x<h>`)
pub struct ScriptedVision {
    pub fail: bool,
    pub calls: Mutex<usize>,
}

impl ScriptedVision {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    fn name(&self) -> &str {
        "scripted-vision"
    }

    async fn analyze(&self, image: &ImageInput, prompt: &str) -> anyhow::Result<String> {
        *self.calls.lock().unwrap() += 1;
        assert!(prompt.contains("CLINICAL CONTEXT"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        if self.fail {
            anyhow::bail!("vision API returned 503 Service Unavailable");
        }

        Ok(format!(
            "**VISUAL FINDINGS:**
Frontal chest X-ray, marker IMG-{}x{}.
The cardiac silhouette is normal.

**ABNORMAL FINDINGS:**
1. Right lower lobe consolidation with air bronchograms
2. Blunting of the right costophrenic angle

**DIFFERENTIAL DIAGNOSIS:**
- Community-acquired pneumonia
- Aspiration pneumonitis

**TECHNICAL QUALITY:** Good exposure.

**CONFIDENCE:** 8/10",
            image.width, image.height
        ))
    }
}

/// Answers the reasoning and critique prompts, echoing the image marker it was given
#[derive(Default)]
pub struct ScriptedText {
    pub prompts: Mutex<Vec<String>>,
}

fn image_marker(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .find(|word| word.starts_with("IMG-"))
        .map(|word| word.trim_end_matches('.').to_string())
        .unwrap_or_else(|| "no-marker".to_string())
}

#[async_trait]
impl TextModel for ScriptedText {
    fn name(&self) -> &str {
        "scripted-text"
    }

    async fn generate(&self, _preamble: &str, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        tokio::time::sleep(Duration::from_millis(5)).await;
        let marker = image_marker(prompt);

        if prompt.contains("Critically review") {
            Ok(format!(
                "1. Potential Risks or Missed Diagnoses\nAn underlying mass near {} could be obscured.\n\
                 4. Clinical Safety Considerations\nEscalate care if the patient becomes hypoxic.",
                marker
            ))
        } else {
            Ok(format!(
                "1. Primary Diagnostic Impression\nRight lower lobe pneumonia ({}).\n\
                 2. Differential Diagnoses\n- Aspiration\n- Atelectasis\n\
                 4. Recommended Tests or Next Steps\n- Follow-up radiograph in 6 weeks",
                marker
            ))
        }
    }
}

/// Retriever that always serves the same snippets
pub struct FixedRetriever(pub Vec<ContextSnippet>);

#[async_trait]
impl Retriever for FixedRetriever {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn retrieve(&self, _query: &str, top_k: usize) -> anyhow::Result<Vec<ContextSnippet>> {
        Ok(self.0.iter().take(top_k).cloned().collect())
    }
}

pub fn pneumonia_snippet() -> ContextSnippet {
    ContextSnippet {
        source: "builtin/pneumonia".to_string(),
        text: "Lobar pneumonia presents as a focal airspace consolidation.".to_string(),
        relevance: 0.8,
    }
}

pub fn empty_corpus() -> Arc<dyn Retriever> {
    Arc::new(KeywordRetriever::new(Vec::<KnowledgeChunk>::new()))
}

pub fn runner(
    vision: Arc<dyn VisionModel>,
    text: Arc<dyn TextModel>,
    retriever: Option<Arc<dyn Retriever>>,
) -> FlowRunner {
    let graph = build_diagnostic_workflow(PipelineAgents {
        vision,
        text,
        retriever,
        top_k: 5,
    })
    .unwrap();
    FlowRunner::new(Arc::new(graph))
}
