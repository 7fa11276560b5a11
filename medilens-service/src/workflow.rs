use std::sync::Arc;
use std::time::Duration;

use medilens_flow::{FlowRunner, Graph, GraphBuilder, Result, Stage};
use tracing::info;

use crate::agents::{
    ImageAnalyzerAgent, MedicalReasonerAgent, ReportWriterAgent, RetrieverAgent, RiskCriticAgent,
};
use crate::config::ServiceConfig;
use crate::llm::{OpenRouterVision, RigTextModel, TextModel, VisionModel};
use crate::retrieval::{Retriever, build_retriever};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Client handles the diagnostic graph's tasks are built from
#[derive(Clone)]
pub struct PipelineAgents {
    pub vision: Arc<dyn VisionModel>,
    pub text: Arc<dyn TextModel>,
    /// `None` leaves the retrieval stage out of the graph
    pub retriever: Option<Arc<dyn Retriever>>,
    pub top_k: usize,
}

/// Image analysis → (retrieval, when the request asks for context) → reasoning → critique →
/// report writing
pub fn build_diagnostic_workflow(agents: PipelineAgents) -> Result<Graph> {
    let builder = GraphBuilder::new("diagnostic_workflow")
        .add_task(Arc::new(ImageAnalyzerAgent::new(agents.vision)))
        .add_task(Arc::new(MedicalReasonerAgent::new(agents.text.clone())))
        .add_task(Arc::new(RiskCriticAgent::new(agents.text)))
        .add_task(Arc::new(ReportWriterAgent));

    let builder = match agents.retriever {
        Some(retriever) => builder
            .add_task(Arc::new(RetrieverAgent::new(retriever, agents.top_k)))
            .add_conditional_edge(
                Stage::ImageAnalysis,
                |session| session.use_context(),
                Stage::Retrieval,
                Stage::Reasoning,
            )
            .add_edge(Stage::Retrieval, Stage::Reasoning),
        None => builder.add_edge(Stage::ImageAnalysis, Stage::Reasoning),
    };

    builder
        .add_edge(Stage::Reasoning, Stage::Critique)
        .add_edge(Stage::Critique, Stage::ReportWriting)
        .set_start_task(Stage::ImageAnalysis)
        .build()
}

/// Create the model clients and retriever once and wrap the graph in a runner
pub async fn create_flow_runner(config: &ServiceConfig) -> anyhow::Result<FlowRunner> {
    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    let vision: Arc<dyn VisionModel> = Arc::new(OpenRouterVision::new(
        http,
        config.openrouter_base_url.as_str(),
        config.openrouter_api_key.as_str(),
        config.vision.clone(),
    ));
    let text: Arc<dyn TextModel> = Arc::new(RigTextModel::new(
        &config.openrouter_base_url,
        &config.openrouter_api_key,
        config.text.clone(),
    ));
    let retriever = build_retriever(&config.retrieval).await?;

    let graph = build_diagnostic_workflow(PipelineAgents {
        vision,
        text,
        retriever,
        top_k: config.retrieval.top_k,
    })?;

    info!(
        graph = %graph.id,
        stages = ?graph.stages(),
        vision_model = %config.vision.model,
        text_model = %config.text.model,
        "diagnostic workflow ready"
    );
    Ok(FlowRunner::new(Arc::new(graph)))
}
