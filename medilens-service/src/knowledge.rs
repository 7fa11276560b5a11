use std::path::Path;

use anyhow::Context as _;
use tracing::{info, warn};

/// A chunk of reference text the retrievers search over
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeChunk {
    pub source: String,
    pub text: String,
}

/// Reference snippets used when no knowledge base directory is available
const BUILTIN_CORPUS: &[(&str, &str)] = &[
    (
        "builtin/chest_radiography",
        "Chest X-rays help identify lung infections, pleural effusions and heart enlargement. \
         A cardiothoracic ratio above 0.5 on a PA film suggests cardiomegaly.",
    ),
    (
        "builtin/pulmonary_edema",
        "Pulmonary edema often appears with cardiomegaly, bilateral perihilar infiltrates, \
         Kerley B lines and upper lobe venous diversion.",
    ),
    (
        "builtin/pneumonia",
        "Lobar pneumonia presents as a focal airspace consolidation with air bronchograms; \
         correlate with fever, leukocytosis and auscultation findings.",
    ),
    (
        "builtin/pneumothorax",
        "Pneumothorax shows a visceral pleural line with absent lung markings peripherally; \
         tension pneumothorax causes mediastinal shift and is a clinical emergency.",
    ),
    (
        "builtin/mri_soft_tissue",
        "MRI scans are ideal for evaluating soft tissues like brain, spinal cord, ligaments \
         and muscles.",
    ),
    (
        "builtin/ct_trauma",
        "CT is useful for viewing complex fractures, organ damage and internal bleeding after \
         trauma.",
    ),
    (
        "builtin/fracture_radiograph",
        "Fractures on plain radiographs appear as lucent lines with cortical disruption; \
         at least two orthogonal views are recommended.",
    ),
];

pub fn builtin_corpus() -> Vec<KnowledgeChunk> {
    BUILTIN_CORPUS
        .iter()
        .map(|(source, text)| KnowledgeChunk {
            source: source.to_string(),
            text: text.split_whitespace().collect::<Vec<_>>().join(" "),
        })
        .collect()
}

/// Read every `*.txt` file under `path` (sorted by name) and split it into overlapping chunks.
///
/// A missing directory falls back to the built-in reference corpus. An existing but empty
/// directory yields an empty corpus.
pub async fn load_knowledge_base(
    path: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
) -> anyhow::Result<Vec<KnowledgeChunk>> {
    if !tokio::fs::try_exists(path).await? {
        warn!(
            path = %path.display(),
            "knowledge base directory not found, using built-in reference corpus"
        );
        return Ok(builtin_corpus());
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("failed to read knowledge base at {}", path.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let file_path = entry.path();
        if file_path.extension().and_then(|ext| ext.to_str()) == Some("txt") {
            files.push(file_path);
        }
    }
    files.sort();

    let mut chunks = Vec::new();
    for file in files {
        let source = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = match tokio::fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %source, error = %e, "skipping unreadable knowledge file");
                continue;
            }
        };

        for text in chunk_text(&content, chunk_size, chunk_overlap) {
            chunks.push(KnowledgeChunk {
                source: source.clone(),
                text,
            });
        }
    }

    info!(
        path = %path.display(),
        chunks = chunks.len(),
        "knowledge base loaded"
    );
    Ok(chunks)
}

/// Split text into windows of `size` characters, each overlapping the previous by `overlap`
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
