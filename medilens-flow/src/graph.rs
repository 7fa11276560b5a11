use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{Instrument, debug, error, info, info_span};

use crate::{
    error::{GraphError, Result},
    session::{DiagnosticSession, PipelineState},
    task::{NextAction, Stage, Task},
};

/// Type alias for edge condition functions
pub type EdgeCondition = Arc<dyn Fn(&DiagnosticSession) -> bool + Send + Sync>;

#[derive(Clone)]
enum EdgeTarget {
    Always(Stage),
    Branch {
        condition: EdgeCondition,
        yes: Stage,
        no: Stage,
    },
}

/// Edge between stages in the graph
#[derive(Clone)]
pub struct Edge {
    from: Stage,
    target: EdgeTarget,
}

impl Edge {
    fn targets(&self) -> Vec<Stage> {
        match &self.target {
            EdgeTarget::Always(to) => vec![*to],
            EdgeTarget::Branch { yes, no, .. } => vec![*yes, *no],
        }
    }
}

/// A validated, forward-only graph of pipeline stages.
///
/// Built once at startup and shared read-only between requests.
pub struct Graph {
    pub id: String,
    tasks: BTreeMap<Stage, Arc<dyn Task>>,
    edges: Vec<Edge>,
    start: Stage,
}

impl Graph {
    pub fn start_stage(&self) -> Stage {
        self.start
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.tasks.keys().copied().collect()
    }

    pub fn has_stage(&self, stage: Stage) -> bool {
        self.tasks.contains_key(&stage)
    }

    /// Run every stage from the start task until the chain ends.
    ///
    /// The first failing stage moves the session to [`PipelineState::Failed`]
    /// and its error is returned; nothing downstream runs.
    pub async fn execute(&self, session: &mut DiagnosticSession) -> Result<ExecutionResult> {
        if session.state() != &PipelineState::Init {
            return Err(GraphError::InvalidGraph(format!(
                "session {} has already been executed (state: {})",
                session.id(),
                session.state().label()
            )));
        }

        let mut stages = Vec::new();
        let mut status_message = None;
        let mut current = Some(self.start);

        while let Some(stage) = current {
            let task = self
                .tasks
                .get(&stage)
                .ok_or(GraphError::TaskNotFound(stage))?;

            let started_at = Utc::now();
            let span = info_span!("stage", session_id = %session.id(), stage = %stage);
            debug!(session_id = %session.id(), stage = %stage, "running stage");

            let run = task.run(session).instrument(span).await;
            let outcome = match run {
                Ok(result) => session.complete_stage(stage, started_at).map(|_| result),
                Err(e) => Err(e),
            };

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        session_id = %session.id(),
                        stage = %stage,
                        error = %e,
                        "stage failed, aborting pipeline"
                    );
                    session.fail_stage(stage, started_at, e.to_string());
                    return Err(e);
                }
            };

            stages.push(stage);
            if result.status_message.is_some() {
                status_message = result.status_message;
            }

            current = match result.next_action {
                NextAction::Continue => self.find_next_task(stage, session),
                NextAction::End => None,
            };
        }

        let status = if session.state() == &PipelineState::ReportReady {
            ExecutionStatus::Completed
        } else {
            // The start task is always run, so at least one stage exists
            ExecutionStatus::Halted {
                at: stages.last().copied().unwrap_or(self.start),
            }
        };

        info!(
            session_id = %session.id(),
            status = ?status,
            stages = stages.len(),
            "pipeline finished"
        );

        Ok(ExecutionResult {
            status,
            stages,
            status_message,
        })
    }

    /// Find the next stage based on edges and conditions
    pub fn find_next_task(&self, current: Stage, session: &DiagnosticSession) -> Option<Stage> {
        self.edges
            .iter()
            .find(|edge| edge.from == current)
            .map(|edge| match &edge.target {
                EdgeTarget::Always(to) => *to,
                EdgeTarget::Branch { condition, yes, no } => {
                    if condition(session) {
                        *yes
                    } else {
                        *no
                    }
                }
            })
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    id: String,
    tasks: Vec<Arc<dyn Task>>,
    edges: Vec<Edge>,
    start: Option<Stage>,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: Vec::new(),
            edges: Vec::new(),
            start: None,
        }
    }

    /// Add a task; the first task added becomes the start task unless overridden
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn add_edge(mut self, from: Stage, to: Stage) -> Self {
        self.edges.push(Edge {
            from,
            target: EdgeTarget::Always(to),
        });
        self
    }

    /// Branch to `yes` when the condition holds for the session, otherwise to `no`
    pub fn add_conditional_edge<F>(mut self, from: Stage, condition: F, yes: Stage, no: Stage) -> Self
    where
        F: Fn(&DiagnosticSession) -> bool + Send + Sync + 'static,
    {
        self.edges.push(Edge {
            from,
            target: EdgeTarget::Branch {
                condition: Arc::new(condition),
                yes,
                no,
            },
        });
        self
    }

    pub fn set_start_task(mut self, stage: Stage) -> Self {
        self.start = Some(stage);
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Rejects duplicate stages, edges that touch unregistered stages, edges
    /// that point backwards and stages with more than one outgoing edge.
    pub fn build(self) -> Result<Graph> {
        let mut tasks = BTreeMap::new();
        for task in &self.tasks {
            if tasks.insert(task.stage(), task.clone()).is_some() {
                return Err(GraphError::InvalidGraph(format!(
                    "stage {} registered twice",
                    task.stage()
                )));
            }
        }

        let start = self
            .start
            .or_else(|| self.tasks.first().map(|task| task.stage()))
            .ok_or_else(|| GraphError::InvalidGraph("graph has no tasks".to_string()))?;
        if !tasks.contains_key(&start) {
            return Err(GraphError::TaskNotFound(start));
        }

        let mut seen_sources = Vec::new();
        for edge in &self.edges {
            if seen_sources.contains(&edge.from) {
                return Err(GraphError::InvalidGraph(format!(
                    "stage {} has more than one outgoing edge",
                    edge.from
                )));
            }
            seen_sources.push(edge.from);

            if !tasks.contains_key(&edge.from) {
                return Err(GraphError::TaskNotFound(edge.from));
            }
            for to in edge.targets() {
                if !tasks.contains_key(&to) {
                    return Err(GraphError::TaskNotFound(to));
                }
                if to <= edge.from {
                    return Err(GraphError::InvalidGraph(format!(
                        "edge {} -> {} does not move forward",
                        edge.from, to
                    )));
                }
            }
        }

        Ok(Graph {
            id: self.id,
            tasks,
            edges: self.edges,
            start,
        })
    }
}

/// Outcome of a graph execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Stages that ran, in order
    pub stages: Vec<Stage>,
    /// Status message of the last stage that reported one
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The report stage ran and the session is `ReportReady`
    Completed,
    /// A task ended the chain before a report was produced
    Halted { at: Stage },
}
