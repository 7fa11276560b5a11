use std::sync::Arc;

use async_trait::async_trait;
use medilens_flow::{DiagnosticSession, GraphError, Result, Stage, Task, TaskResult};
use tracing::{debug, info};

use crate::retrieval::Retriever;

/// Fetches reference snippets for the clinical question and the imaging findings
pub struct RetrieverAgent {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl RetrieverAgent {
    pub fn new(retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        Self { retriever, top_k }
    }
}

#[async_trait]
impl Task for RetrieverAgent {
    fn stage(&self) -> Stage {
        Stage::Retrieval
    }

    async fn run(&self, session: &mut DiagnosticSession) -> Result<TaskResult> {
        let query = retrieval_query(session);
        info!(
            session_id = %session.id(),
            backend = self.retriever.name(),
            top_k = self.top_k,
            "Retrieving clinical context"
        );
        debug!(query = %query, "retrieval query");

        let mut snippets = self
            .retriever
            .retrieve(&query, self.top_k)
            .await
            .map_err(|e| GraphError::external(Stage::Retrieval, format!("{:#}", e)))?;
        snippets.truncate(self.top_k);

        let count = snippets.len();
        session.record_retrieved_context(snippets)?;

        info!(snippets = count, "Context retrieval completed");
        Ok(TaskResult::proceed(format!("Retrieved {} context snippets", count)))
    }
}

/// The clinical question enriched with what the image stage saw
fn retrieval_query(session: &DiagnosticSession) -> String {
    let mut parts = vec![session.query().to_string()];

    if let Some(findings) = session.visual_findings() {
        let structured = &findings.structured;
        if structured.modality != "unknown" {
            parts.push(structured.modality.clone());
        }
        if structured.anatomical_region != "unspecified" {
            parts.push(structured.anatomical_region.clone());
        }
        parts.extend(structured.key_findings.iter().cloned());
    }

    parts.join(" ")
}
