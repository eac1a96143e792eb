//! OCR Viewer - renders recognition results over the uploaded image.

mod config;
mod error;
mod geometry;
mod modal;
mod normalize;
mod ocr;
mod page;
mod schema;
mod session;
mod threshold;
mod view;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use config::ViewerConfig;
use error::ViewerError;
use geometry::Size;
use modal::{ModalOverlay, ModalShell, ZoomSource};
use ocr::{remote::HttpRecognizer, ImageUpload, Recognizer};
use schema::ActiveView;
use session::{SessionStore, Snapshot};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    session: SessionStore,
    recognizer: Arc<dyn Recognizer>,
    config: Arc<ViewerConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_viewer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ViewerConfig::load()?;
    info!("Recognition endpoint: {}", config.recognition_url);

    let recognizer = HttpRecognizer::new(config.recognition_url.clone(), config.request_timeout())?;
    let state = AppState {
        session: SessionStore::new(config.render.clone(), config.notice_ttl()),
        recognizer: Arc::new(recognizer),
        config: Arc::new(config),
    };

    let bind_addr = state.config.bind_addr.clone();
    let app = app(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    // Headroom above the file limit so oversized files reach validation.
    let body_limit = state.config.max_upload_bytes + 1024 * 1024;

    Router::new()
        .route("/health", get(health))
        .route("/", get(index))
        .route("/recognize", post(recognize))
        .route("/upload", post(upload))
        .route("/api/view", get(api_view))
        .route("/view/toggle", post(toggle_view))
        .route("/view/threshold", post(set_threshold))
        .route("/view/inline-size", post(set_inline_size))
        .route("/text", get(text))
        .route("/download", get(download))
        .route("/zoom", get(zoom_overlay))
        .route("/zoom/open", post(open_zoom))
        .route("/zoom/rendered", post(zoom_rendered))
        .route("/zoom/close", post(close_zoom))
        .route("/reset", post(reset))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, ViewerError> {
    page::render_page(&state.session, state.config.max_upload_bytes).map(Html)
}

/// Upload an image and return the rendered session as JSON.
async fn recognize(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Snapshot>, ViewerError> {
    recognize_upload(&state, multipart).await.map(Json)
}

/// Form variant of `/recognize`; failures surface as the page notice.
async fn upload(State(state): State<AppState>, multipart: Multipart) -> Redirect {
    let _ = recognize_upload(&state, multipart).await;
    Redirect::to("/")
}

async fn api_view(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.session.snapshot())
}

#[derive(serde::Deserialize)]
struct ToggleForm {
    view: ActiveView,
}

async fn toggle_view(State(state): State<AppState>, Form(form): Form<ToggleForm>) -> Redirect {
    match state.session.toggle(form.view) {
        Ok(outcome) => debug!("Toggle to {:?}: {:?}", form.view, outcome),
        Err(e) => state.session.notify(&e),
    }
    Redirect::to("/")
}

#[derive(serde::Deserialize)]
struct ThresholdForm {
    percent: i64,
}

async fn set_threshold(State(state): State<AppState>, Form(form): Form<ThresholdForm>) -> Redirect {
    if let Err(e) = state.session.set_threshold(form.percent) {
        state.session.notify(&e);
    }
    Redirect::to("/")
}

#[derive(serde::Deserialize)]
struct SizeForm {
    width: f64,
    height: f64,
}

async fn set_inline_size(
    State(state): State<AppState>,
    Form(form): Form<SizeForm>,
) -> Result<StatusCode, ViewerError> {
    state
        .session
        .set_inline_size(Size::new(form.width, form.height))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Derived text of the visible items (copy action).
async fn text(State(state): State<AppState>) -> Result<String, ViewerError> {
    state.session.text()
}

async fn download(State(state): State<AppState>) -> Result<Response, ViewerError> {
    let text = state.session.text()?;
    if text.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let disposition = format!("attachment; filename=\"{}\"", page::download_filename());
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        text,
    )
        .into_response())
}

#[derive(serde::Deserialize)]
struct ZoomForm {
    source: ZoomSource,
}

async fn open_zoom(
    State(state): State<AppState>,
    Form(form): Form<ZoomForm>,
) -> Result<Json<ModalShell>, ViewerError> {
    state.session.open_zoom(form.source).map(Json)
}

async fn zoom_rendered(
    State(state): State<AppState>,
    Form(form): Form<SizeForm>,
) -> Result<StatusCode, ViewerError> {
    state
        .session
        .zoom_rendered(Size::new(form.width, form.height))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Wait for the modal image to render, then return its annotations.
async fn zoom_overlay(State(state): State<AppState>) -> Result<Json<ModalOverlay>, ViewerError> {
    state
        .session
        .zoom_overlay(state.config.modal_ready_timeout())
        .await
        .map(Json)
}

async fn close_zoom(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "closed": state.session.close_zoom() }))
}

async fn reset(State(state): State<AppState>) -> Redirect {
    state.session.reset();
    info!("Session reset");
    Redirect::to("/")
}

// ============================================================================
// Recognition pipeline
// ============================================================================

/// Validate, recognize, normalize and install a new result.
///
/// Any failure is logged and posted as the session notice.
async fn recognize_upload(state: &AppState, multipart: Multipart) -> Result<Snapshot, ViewerError> {
    let outcome = run_recognition(state, multipart).await;
    if let Err(e) = &outcome {
        match e {
            ViewerError::InputValidation { .. } | ViewerError::Busy => warn!("Upload rejected: {}", e),
            _ => error!("Recognition failed: {}", e),
        }
        state.session.notify(e);
    }
    outcome
}

async fn run_recognition(state: &AppState, multipart: Multipart) -> Result<Snapshot, ViewerError> {
    let upload = read_upload(multipart, state.config.max_upload_bytes).await?;
    let busy = state.session.begin_recognition()?;

    info!(
        "Received image: {} ({} bytes, {}) via {}",
        upload.filename,
        upload.data.len(),
        upload.mime,
        state.recognizer.name()
    );
    let payload = state.recognizer.recognize(&upload).await?;
    let result = normalize::normalize(payload, state.session.render_config())?;
    state.session.replace(result);
    drop(busy);
    Ok(state.session.snapshot())
}

/// Read the `file` field and validate it.
async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> Result<ImageUpload, ViewerError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let mime = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(multipart_error)?.to_vec();
            return ImageUpload::validate(&filename, mime.as_deref(), data, max_bytes);
        }
    }
    Err(ViewerError::invalid("No file selected"))
}

fn multipart_error(e: MultipartError) -> ViewerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ViewerError::too_large("The uploaded file is too large")
    } else {
        ViewerError::invalid(format!("Malformed upload: {}", e.body_text()))
    }
}
