//! HTTP server for the course catalog.
//!
//! Every request passes through a counting middleware before routing, so
//! the status endpoint reflects all traffic including redirects and errors.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`/`POST` | `/courses`, `/api`, `/api/courses` | Query the catalog |
//! | `GET`  | `/status`, `/api/status` | Version, uptime, dataset date, request count |
//! | `GET`  | `/favicon.ico` | Always `204 No Content` |
//! | `GET`  | `/` | Plain-text index |
//! | any    | anything else | `302 Found` to `/` |
//!
//! Each catalog and status path also answers with a trailing slash. A known
//! path hit with an unsupported method redirects like an unknown path.
//!
//! # Parameters
//!
//! Query parameters come from the URL query string and, optionally, a JSON
//! object body (accepted on both `GET` and `POST`). The two sources are
//! merged before evaluation.
//!
//! # Error Contract
//!
//! Errors are rendered in the same representation the caller asked for:
//!
//! ```json
//! { "error": "unknown parameter \"foo\"" }
//! ```
//!
//! `400` carries the validation message verbatim. `500` always carries
//! `"Oops! Something went wrong."`; the detail is only logged.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{RawQuery, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::QueryError;
use crate::format::{negotiate, render, Format, Representable};
use crate::models::ErrorBody;
use crate::params::RawParams;
use crate::query::QueryEngine;
use crate::status::ServiceStatus;
use crate::store::CourseStore;

const INTERNAL_ERROR_MESSAGE: &str = "Oops! Something went wrong.";

const INDEX_TEXT: &str = "Course catalog\n\n\
GET  /courses?subject=COP&keywords=programming\n\
POST /courses {\"subject\": [\"COP\", \"CDA\"], \"limit\": 5}\n\
GET  /status\n";

const QUERY_PATHS: [&str; 3] = ["/courses", "/api", "/api/courses"];

const STATUS_PATHS: [&str; 2] = ["/status", "/api/status"];

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    engine: QueryEngine,
    status: Arc<ServiceStatus>,
}

impl AppState {
    pub fn new(engine: QueryEngine) -> Self {
        let status = Arc::new(ServiceStatus::new(engine.store().data_as_of()));
        Self { engine, status }
    }
}

/// Loads the dataset named in `[data].path` and builds the query engine.
pub fn load_engine(config: &Config) -> anyhow::Result<QueryEngine> {
    let store = CourseStore::load(&config.data.path)?;
    tracing::info!(
        path = %config.data.path.display(),
        courses = store.len(),
        data_as_of = store.data_as_of(),
        "Loaded course data"
    );

    let engine = QueryEngine::from_store(store).with_max_keywords(config.query.max_keywords);
    tracing::info!(
        stems = engine.index().stem_count(),
        phonetics = engine.index().phonetic_count(),
        "Built token index"
    );
    Ok(engine)
}

/// Builds the router with all routes and middleware attached.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/", get(handle_index))
        .route("/favicon.ico", get(handle_favicon));
    for path in QUERY_PATHS {
        app = app
            .route(path, get(handle_courses).post(handle_courses))
            .route(&format!("{}/", path), get(handle_courses).post(handle_courses));
    }
    for path in STATUS_PATHS {
        app = app
            .route(path, get(handle_status))
            .route(&format!("{}/", path), get(handle_status));
    }

    app.fallback(redirect_to_index)
        .method_not_allowed_fallback(redirect_to_index)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Loads the dataset, builds the index, binds to `[server].bind`, and
/// serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = load_engine(config)?;
    let app = router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!(bind = %config.server.bind, "Course server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Middleware ============

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let seq = state.status.record_request();
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("request", id = %request_id, seq);

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

// ============ Error response ============

/// Error type that converts into a format-negotiated HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
    format: Format,
}

impl AppError {
    fn from_query(err: QueryError, format: Format) -> Self {
        let status = err.status_code();
        let message = match err {
            QueryError::Validation(message) => message,
            QueryError::Internal(detail) => {
                tracing::error!(error = ?detail, "Query failed");
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        };
        Self {
            status,
            message,
            format,
        }
    }

    fn internal(detail: anyhow::Error, format: Format) -> Self {
        Self::from_query(QueryError::Internal(detail), format)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        match render(&body, self.format) {
            Ok(rendered) => (
                self.status,
                [(header::CONTENT_TYPE, rendered.content_type)],
                rendered.body,
            )
                .into_response(),
            Err(err) => {
                tracing::error!(error = ?err, "Failed to render error body");
                (self.status, INTERNAL_ERROR_MESSAGE).into_response()
            }
        }
    }
}

/// Renders `value` in `format`, or an internal error in the same format.
fn respond<T: Representable>(value: &T, format: Format) -> Result<Response, AppError> {
    let rendered = render(value, format).map_err(|e| AppError::internal(e, format))?;
    Ok((
        [(header::CONTENT_TYPE, rendered.content_type)],
        rendered.body,
    )
        .into_response())
}

/// Picks the representation from the sources' `format` values and the
/// `Accept` header. A negotiation failure is reported as JSON.
fn negotiate_format(sources: &[RawParams], headers: &HeaderMap) -> Result<Format, AppError> {
    let explicit = sources.iter().find_map(RawParams::format);
    let accept = headers.get(header::ACCEPT).map(HeaderValue::as_bytes);
    negotiate(explicit, accept).map_err(|e| AppError::from_query(e, Format::Json))
}

fn body_params(body: &Bytes) -> Result<Option<RawParams>, QueryError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| QueryError::validation(format!("request body is not valid JSON: {}", e)))?;
    RawParams::from_json(&value).map(Some)
}

// ============ /courses ============

/// Handler for `GET|POST /courses` and its aliases.
async fn handle_courses(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let mut sources = vec![RawParams::from_query_str(query.as_deref().unwrap_or(""))];

    // The body can only be trusted for `format` once it parses, so a bad
    // body is reported in the query-string/Accept representation.
    match body_params(&body) {
        Ok(Some(params)) => sources.push(params),
        Ok(None) => {}
        Err(err) => {
            let format = negotiate_format(&sources, &headers)?;
            return Err(AppError::from_query(err, format));
        }
    }

    let format = negotiate_format(&sources, &headers)?;
    let shape = state
        .engine
        .query_by(&sources)
        .map_err(|e| AppError::from_query(e, format))?;
    tracing::debug!(total = shape.total, returned = shape.results.len(), "Query evaluated");

    respond(&shape, format)
}

// ============ /status ============

async fn handle_status(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let sources = [RawParams::from_query_str(query.as_deref().unwrap_or(""))];
    let format = negotiate_format(&sources, &headers)?;
    respond(&state.status.snapshot(), format)
}

// ============ misc ============

async fn handle_index() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, Format::Text.content_type())],
        INDEX_TEXT,
    )
}

async fn handle_favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn redirect_to_index() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}
