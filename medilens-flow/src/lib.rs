pub mod error;
pub mod graph;
pub mod models;
pub mod runner;
pub mod session;
pub mod task;

// Re-export commonly used types
pub use error::{GraphError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use models::{ContextSnippet, DiagnosticReport, ReportSection, StructuredFindings, VisualFindings};
pub use runner::FlowRunner;
pub use session::{DiagnosticSession, ImageInput, PipelineState, StageRecord};
pub use task::{NextAction, Stage, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    use crate::session::tests::png_bytes;

    struct StubTask {
        stage: Stage,
        log: Arc<Mutex<Vec<Stage>>>,
        fail: bool,
        next_action: NextAction,
    }

    #[async_trait]
    impl Task for StubTask {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn run(&self, session: &mut DiagnosticSession) -> Result<TaskResult> {
            self.log.lock().unwrap().push(self.stage);
            if self.fail {
                return Err(GraphError::external(self.stage, "service unavailable"));
            }

            match self.stage {
                Stage::ImageAnalysis => session.record_visual_findings(VisualFindings {
                    text: "opacity in right lower lobe".to_string(),
                    structured: StructuredFindings::default(),
                })?,
                Stage::Retrieval => session.record_retrieved_context(Vec::new())?,
                Stage::Reasoning => {
                    session.require_visual_findings()?;
                    session.record_hypothesis("community-acquired pneumonia")?
                }
                Stage::Critique => {
                    session.require_hypothesis()?;
                    session.record_critique("consider aspiration")?
                }
                Stage::ReportWriting => session.record_report(DiagnosticReport {
                    session_id: session.id().to_string(),
                    generated_at: Utc::now(),
                    query: session.query().to_string(),
                    sections: Vec::new(),
                })?,
            }

            Ok(TaskResult::new(
                Some(format!("{} done", self.stage)),
                self.next_action,
            ))
        }
    }

    fn stub(stage: Stage, log: &Arc<Mutex<Vec<Stage>>>, failing: Option<Stage>) -> Arc<dyn Task> {
        Arc::new(StubTask {
            stage,
            log: log.clone(),
            fail: failing == Some(stage),
            next_action: NextAction::Continue,
        })
    }

    fn pipeline(log: &Arc<Mutex<Vec<Stage>>>, failing: Option<Stage>) -> Graph {
        let mut builder = GraphBuilder::new("test_pipeline");
        for stage in Stage::ALL {
            builder = builder.add_task(stub(stage, log, failing));
        }
        builder
            .add_conditional_edge(
                Stage::ImageAnalysis,
                |session| session.use_context(),
                Stage::Retrieval,
                Stage::Reasoning,
            )
            .add_edge(Stage::Retrieval, Stage::Reasoning)
            .add_edge(Stage::Reasoning, Stage::Critique)
            .add_edge(Stage::Critique, Stage::ReportWriting)
            .build()
            .unwrap()
    }

    fn session(use_context: bool) -> DiagnosticSession {
        let image = ImageInput::from_bytes(png_bytes(128, 128), Some("xray.png".into())).unwrap();
        DiagnosticSession::new(image, "any abnormalities?", use_context).unwrap()
    }

    #[tokio::test]
    async fn test_linear_pipeline_execution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = pipeline(&log, None);
        let mut session = session(true);

        let result = graph.execute(&mut session).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.stages, Stage::ALL.to_vec());
        assert_eq!(*log.lock().unwrap(), Stage::ALL.to_vec());
        assert_eq!(session.state(), &PipelineState::ReportReady);
        assert_eq!(session.completed_stages(), Stage::ALL.to_vec());
        assert_eq!(result.status_message.as_deref(), Some("report_writing done"));
    }

    #[tokio::test]
    async fn test_conditional_edge_skips_retrieval() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = pipeline(&log, None);
        let mut session = session(false);

        graph.execute(&mut session).await.unwrap();

        assert!(!log.lock().unwrap().contains(&Stage::Retrieval));
        assert!(session.retrieved_context().is_none());
        assert_eq!(session.state(), &PipelineState::ReportReady);
    }

    #[tokio::test]
    async fn test_first_failure_aborts_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = pipeline(&log, Some(Stage::ImageAnalysis));
        let mut session = session(true);

        let err = graph.execute(&mut session).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::ImageAnalysis));
        assert_eq!(*log.lock().unwrap(), vec![Stage::ImageAnalysis]);
        assert!(matches!(
            session.state(),
            PipelineState::Failed { stage: Stage::ImageAnalysis, .. }
        ));
        assert!(session.visual_findings().is_none());
        assert!(session.report().is_none());
    }

    #[tokio::test]
    async fn test_session_cannot_be_executed_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = pipeline(&log, None);
        let mut session = session(true);

        graph.execute(&mut session).await.unwrap();
        let err = graph.execute(&mut session).await.unwrap_err();

        assert!(matches!(err, GraphError::InvalidGraph(_)));
        assert_eq!(log.lock().unwrap().len(), Stage::ALL.len());
    }

    #[tokio::test]
    async fn test_end_action_halts_before_report() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let early_exit: Arc<dyn Task> = Arc::new(StubTask {
            stage: Stage::Reasoning,
            log: log.clone(),
            fail: false,
            next_action: NextAction::End,
        });
        let graph = GraphBuilder::new("halting")
            .add_task(stub(Stage::ImageAnalysis, &log, None))
            .add_task(early_exit)
            .add_task(stub(Stage::Critique, &log, None))
            .add_edge(Stage::ImageAnalysis, Stage::Reasoning)
            .add_edge(Stage::Reasoning, Stage::Critique)
            .build()
            .unwrap();
        let mut session = session(false);

        let result = graph.execute(&mut session).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Halted { at: Stage::Reasoning });
        assert_eq!(session.state(), &PipelineState::HypothesisFormed);
    }

    #[tokio::test]
    async fn test_flow_runner_returns_completed_session() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = FlowRunner::new(Arc::new(pipeline(&log, None)));
        let image = ImageInput::from_bytes(png_bytes(200, 150), None).unwrap();

        let session = runner.run(image, "  rule out fracture ", false).await.unwrap();

        assert_eq!(session.query(), "rule out fracture");
        assert_eq!(session.state(), &PipelineState::ReportReady);
        assert!(session.report().is_some());
    }

    #[test]
    fn test_builder_rejects_backward_edges() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = GraphBuilder::new("loop")
            .add_task(stub(Stage::ImageAnalysis, &log, None))
            .add_task(stub(Stage::Reasoning, &log, None))
            .add_edge(Stage::ImageAnalysis, Stage::Reasoning)
            .add_edge(Stage::Reasoning, Stage::ImageAnalysis)
            .build();

        assert!(matches!(result, Err(GraphError::InvalidGraph(_))));
    }

    #[test]
    fn test_builder_rejects_duplicate_and_unknown_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let duplicate = GraphBuilder::new("dup")
            .add_task(stub(Stage::Critique, &log, None))
            .add_task(stub(Stage::Critique, &log, None))
            .build();
        assert!(matches!(duplicate, Err(GraphError::InvalidGraph(_))));

        let unknown = GraphBuilder::new("unknown")
            .add_task(stub(Stage::ImageAnalysis, &log, None))
            .add_edge(Stage::ImageAnalysis, Stage::Retrieval)
            .build();
        assert!(matches!(unknown, Err(GraphError::TaskNotFound(Stage::Retrieval))));

        assert!(GraphBuilder::new("empty").build().is_err());
    }
}
