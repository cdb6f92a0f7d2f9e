use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use http::StatusCode;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use denta_ai::{ApiStatus, DesignRequest, ModelError, Session, SessionError};
use denta_case::{Case, CaseError, Scan};
use denta_mesh::{MeshSummary, read_stl};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Builds a session from an API key. Swapped out in tests so no handler
/// ever talks to the real service.
pub type SessionConnector = Arc<dyn Fn(&str) -> Result<Session, SessionError> + Send + Sync>;

struct AppState {
    case: RwLock<Case>,
    session: RwLock<Option<Arc<Session>>>,
    status: RwLock<ApiStatus>,
    connector: SessionConnector,
}

pub fn app() -> Router {
    app_with_connector(Arc::new(|key: &str| Session::connect(key)))
}

pub fn app_with_connector(connector: SessionConnector) -> Router {
    let state = Arc::new(AppState {
        case: RwLock::new(Case::new()),
        session: RwLock::new(None),
        status: RwLock::new(ApiStatus::NotSet),
        connector,
    });
    Router::new()
        .route("/health", get(health))
        .route("/scans", get(list_scans))
        .route("/scans/{name}", post(upload_scan).patch(update_scan))
        .route(
            "/credential",
            put(set_credential).get(credential_status).delete(clear_credential),
        )
        .route("/design", post(generate_design))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

fn parse_json<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }
    serde_json::from_slice(bytes)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct SummaryJson {
    name: String,
    vertices: usize,
    center: Option<[f64; 3]>,
    size: Option<[f64; 3]>,
    text: String,
}

#[derive(Debug, Serialize)]
struct ScanJson {
    name: String,
    transparency: u8,
    color: [f32; 4],
    summary: SummaryJson,
}

#[derive(Debug, Serialize)]
struct ScanListResponse {
    scans: Vec<ScanJson>,
}

#[derive(Debug, Deserialize)]
struct UpdateScanRequest {
    transparency: u8,
}

#[derive(Debug, Deserialize)]
struct CredentialRequest {
    api_key: String,
}

#[derive(Debug, Serialize)]
struct CredentialResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct DesignRequestBody {
    instruction: String,
}

#[derive(Debug, Serialize)]
struct DesignStats {
    time_ms: f64,
    scan_count: usize,
}

#[derive(Debug, Serialize)]
struct DesignResponse {
    plan: String,
    stats: DesignStats,
}

fn summary_json(summary: MeshSummary) -> SummaryJson {
    let text = summary.to_string();
    SummaryJson {
        name: summary.name,
        vertices: summary.vertex_count,
        center: summary.bounds.map(|bounds| bounds.center),
        size: summary.bounds.map(|bounds| bounds.size),
        text,
    }
}

fn scan_json(scan: &Scan) -> ScanJson {
    ScanJson {
        name: scan.name().to_string(),
        transparency: scan.transparency(),
        color: scan.display_color(),
        summary: summary_json(scan.summary()),
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn list_scans(State(state): State<Arc<AppState>>) -> Json<ScanListResponse> {
    let case = state.case.read();
    Json(ScanListResponse {
        scans: case.scans().iter().map(scan_json).collect(),
    })
}

async fn upload_scan(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<ScanJson>), ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }
    let mesh =
        read_stl(&body).map_err(|err| ApiError::bad_request(format!("invalid STL: {err}")))?;
    let mut case = state.case.write();
    let scan = case.insert_scan(name, mesh);
    log::info!(
        "imported scan '{}' ({} vertices, {} triangles)",
        scan.name(),
        scan.mesh().vertex_count(),
        scan.mesh().triangle_count()
    );
    Ok((StatusCode::CREATED, Json(scan_json(scan))))
}

async fn update_scan(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ScanJson>, ApiError> {
    let request: UpdateScanRequest = parse_json(&body)?;
    let mut case = state.case.write();
    let scan = case
        .set_transparency(&name, request.transparency)
        .map_err(|err| match err {
            CaseError::UnknownScan(_) => ApiError::not_found(err.to_string()),
            CaseError::InvalidTransparency(_) => ApiError::bad_request(err.to_string()),
        })?;
    Ok(Json(scan_json(scan)))
}

async fn credential_status(State(state): State<Arc<AppState>>) -> Json<CredentialResponse> {
    Json(CredentialResponse {
        status: state.status.read().to_string(),
    })
}

/// Stores a new API key by building a session for it. The response carries
/// only a status string; the key itself is neither echoed nor logged.
async fn set_credential(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CredentialResponse>, ApiError> {
    let request: CredentialRequest = parse_json(&body)?;
    let key = request.api_key.trim().to_string();
    if key.is_empty() {
        *state.session.write() = None;
        *state.status.write() = ApiStatus::NotSet;
        log::info!("API credential cleared");
        return Ok(Json(CredentialResponse {
            status: ApiStatus::NotSet.to_string(),
        }));
    }

    let connector = Arc::clone(&state.connector);
    let result = tokio::task::spawn_blocking(move || connector(&key))
        .await
        .map_err(|err| ApiError::internal(format!("credential task failed: {err}")))?;

    let status = match result {
        Ok(session) => {
            *state.session.write() = Some(Arc::new(session));
            ApiStatus::Connected
        }
        Err(err) => {
            *state.session.write() = None;
            log::warn!("credential setup failed: {err}");
            ApiStatus::Error(err.to_string())
        }
    };
    *state.status.write() = status.clone();
    log::info!("API status is now '{status}'");
    Ok(Json(CredentialResponse {
        status: status.to_string(),
    }))
}

async fn clear_credential(State(state): State<Arc<AppState>>) -> Json<CredentialResponse> {
    *state.session.write() = None;
    *state.status.write() = ApiStatus::NotSet;
    log::info!("API credential cleared");
    Json(CredentialResponse {
        status: ApiStatus::NotSet.to_string(),
    })
}

/// Runs one design-plan generation: validate inputs, compose the prompt,
/// make a single call to the model. A failure is returned as-is; the next
/// attempt happens only when the client posts again.
async fn generate_design(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<DesignResponse>, ApiError> {
    let request: DesignRequestBody = parse_json(&body)?;
    let summaries = state.case.read().summaries();
    let design = DesignRequest::new(request.instruction, summaries)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    let session = state
        .session
        .read()
        .clone()
        .ok_or_else(|| ApiError::unauthorized("Gemini API not connected"))?;

    let scan_count = design.summaries().len();
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || session.generate_plan(&design))
        .await
        .map_err(|err| ApiError::internal(format!("design task failed: {err}")))?;
    let time_ms = started.elapsed().as_secs_f64() * 1000.0;

    let plan = result.map_err(|err| {
        log::warn!("design generation failed: {err}");
        map_model_error(err)
    })?;
    log::info!("design plan generated in {time_ms:.1}ms ({scan_count} scans)");
    Ok(Json(DesignResponse {
        plan,
        stats: DesignStats {
            time_ms,
            scan_count,
        },
    }))
}

fn map_model_error(err: ModelError) -> ApiError {
    match err {
        ModelError::Credential(_) => ApiError::unauthorized(err.to_string()),
        ModelError::Transport(_)
        | ModelError::Service { .. }
        | ModelError::MalformedResponse(_) => ApiError::bad_gateway(err.to_string()),
    }
}
