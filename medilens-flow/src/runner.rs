//! FlowRunner: convenience wrapper that creates a [`DiagnosticSession`] for one request and
//! drives it through the shared graph.
//!
//! The runner is created once at startup and cloned into every request handler. It holds only
//! an `Arc<Graph>`, so each request owns its session exclusively while the graph and the
//! client handles captured by its tasks are shared read-only.
//!
//! Use [`FlowRunner::run`] when only the finished session matters. Use
//! [`FlowRunner::start_session`] + [`FlowRunner::run_session`] when the caller needs the
//! session (its id, its `Failed` state) even if a stage errors.

use std::sync::Arc;

use tracing::info;

use crate::{
    error::Result,
    graph::{ExecutionResult, Graph},
    session::{DiagnosticSession, ImageInput},
};

#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Create a fresh session at `Init` for one request
    pub fn start_session(
        &self,
        image: ImageInput,
        query: impl Into<String>,
        use_context: bool,
    ) -> Result<DiagnosticSession> {
        let session = DiagnosticSession::new(image, query, use_context)?;
        info!(
            session_id = %session.id(),
            graph = %self.graph.id,
            use_context,
            "diagnostic session created"
        );
        Ok(session)
    }

    /// Execute the graph for a session the caller keeps ownership of
    pub async fn run_session(&self, session: &mut DiagnosticSession) -> Result<ExecutionResult> {
        self.graph.execute(session).await
    }

    /// Create a session, run every stage and hand back the completed session
    pub async fn run(
        &self,
        image: ImageInput,
        query: impl Into<String>,
        use_context: bool,
    ) -> Result<DiagnosticSession> {
        let mut session = self.start_session(image, query, use_context)?;
        self.run_session(&mut session).await?;
        Ok(session)
    }
}
