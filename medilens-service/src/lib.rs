pub mod agents;
pub mod config;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod models;
pub mod report;
pub mod retrieval;
pub mod service;
pub mod workflow;

pub use config::ServiceConfig;
pub use models::{DiagnoseResponse, ErrorResponse};
pub use report::{ReportFormat, ReportRenderer};
pub use service::{AppState, build_router, create_app};
pub use workflow::{PipelineAgents, build_diagnostic_workflow, create_flow_runner};
