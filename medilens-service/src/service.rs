use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use medilens_flow::{DiagnosticSession, FlowRunner, GraphError, ImageInput, PipelineState};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, debug, error, info};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    models::{DiagnoseResponse, ErrorResponse},
    report::{ReportFormat, ReportRenderer},
    workflow::create_flow_runner,
};

/// Largest accepted request body
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const CORRELATION_HEADER: &str = "x-correlation-id";

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn error_body(message: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        status: "error".to_string(),
        error: message.into(),
        stage: None,
        session_id: None,
    }
}

fn bad_request_error(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_body(message)))
}

fn multipart_error(e: MultipartError) -> ApiError {
    (e.status(), Json(error_body(e.body_text())))
}

/// Validation → 400, external service → 502, anything else → 500
pub fn status_for(error: &GraphError) -> StatusCode {
    match error {
        GraphError::Validation(_) => StatusCode::BAD_REQUEST,
        GraphError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn graph_error(error: &GraphError, session_id: Option<&str>) -> ApiError {
    (
        status_for(error),
        Json(ErrorResponse {
            status: "error".to_string(),
            error: error.to_string(),
            stage: error.stage(),
            session_id: session_id.map(str::to_string),
        }),
    )
}

/// Like [`graph_error`], falling back to the stage the session recorded as failed
fn session_error(error: &GraphError, session: &DiagnosticSession) -> ApiError {
    let (status, Json(mut body)) = graph_error(error, Some(session.id()));
    if let (None, PipelineState::Failed { stage, .. }) = (body.stage, session.state()) {
        body.stage = Some(*stage);
    }
    (status, Json(body))
}

#[derive(Clone)]
pub struct AppState {
    pub runner: FlowRunner,
    pub renderer: ReportRenderer,
}

pub async fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let runner = create_flow_runner(config).await?;
    let renderer = ReportRenderer::new(config.reports_dir.clone());
    Ok(build_router(AppState { runner, renderer }))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/diagnose", post(diagnose))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Tag each request with a correlation id (reusing the caller's when valid) and run it
/// inside a span carrying that id
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header = HeaderValue::from_str(&correlation_id).ok();
    if let Some(value) = &header {
        request.headers_mut().insert(CORRELATION_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "MediLens Diagnostic Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Medical image analysis pipeline: vision findings, clinical context, \
                        diagnostic reasoning, risk review and a structured report",
        "endpoints": {
            "POST /diagnose": "Multipart form: image (file), query, use_context, save_report, report_format (md|pdf)",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Fields of the `POST /diagnose` form
#[derive(Debug, Default)]
struct DiagnoseForm {
    image: Option<(Vec<u8>, Option<String>)>,
    query: Option<String>,
    use_context: bool,
    save_report: bool,
    report_format: ReportFormat,
}

async fn read_form(mut multipart: Multipart) -> Result<DiagnoseForm, ApiError> {
    let mut form = DiagnoseForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.image = Some((bytes.to_vec(), filename));
            }
            "query" => form.query = Some(field.text().await.map_err(multipart_error)?),
            "use_context" => {
                form.use_context = parse_flag(&name, &field.text().await.map_err(multipart_error)?)?
            }
            "save_report" => {
                form.save_report = parse_flag(&name, &field.text().await.map_err(multipart_error)?)?
            }
            "report_format" => {
                let value = field.text().await.map_err(multipart_error)?;
                form.report_format = value.parse().map_err(|e| graph_error(&e, None))?;
            }
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(bad_request_error(format!(
            "invalid value `{}` for {} (expected true or false)",
            other, name
        ))),
    }
}

async fn diagnose(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<DiagnoseResponse> {
    let form = read_form(multipart).await?;

    let (bytes, filename) = form
        .image
        .ok_or_else(|| bad_request_error("image file is required"))?;
    let query = form
        .query
        .ok_or_else(|| bad_request_error("query is required"))?;

    let image = ImageInput::from_bytes(bytes, filename).map_err(|e| graph_error(&e, None))?;
    let mut session = state
        .runner
        .start_session(image, query, form.use_context)
        .map_err(|e| graph_error(&e, None))?;

    info!(
        session_id = %session.id(),
        use_context = form.use_context,
        save_report = form.save_report,
        "Starting diagnosis"
    );

    let result = state.runner.run_session(&mut session).await.map_err(|e| {
        error!(session_id = %session.id(), "Diagnosis failed: {}", e);
        session_error(&e, &session)
    })?;

    let saved_path = match (form.save_report, session.report()) {
        (true, Some(report)) => {
            let path = state
                .renderer
                .save(report, session.image().filename.as_deref(), form.report_format)
                .await
                .map_err(|e| {
                    error!(session_id = %session.id(), "Saving report failed: {}", e);
                    session_error(&e, &session)
                })?;
            Some(path.display().to_string())
        }
        _ => None,
    };

    info!(
        session_id = %session.id(),
        status = ?result.status,
        stages = result.stages.len(),
        "Diagnosis finished"
    );

    Ok(Json(DiagnoseResponse::from_session(
        &session, &result, saved_path,
    )))
}
