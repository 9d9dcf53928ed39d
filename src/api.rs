//! HTTP API for the invoice server

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::Database;
use crate::delivery;
use crate::error::ValidationError;
use crate::lifecycle::TransitionError;
use crate::models::{Invoice, InvoicePayload, InvoiceSummary, StatusUpdate, TradeType};

/// Application state shared across handlers
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Arc<Self> {
        Arc::new(Self { db, config })
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route(
            "/invoices/templates/compliance-notes",
            get(compliance_notes),
        )
        .route("/invoices/{id}", get(get_invoice).put(update_invoice))
        .route("/invoices/{id}/status", patch(update_status))
        .route("/invoices/{id}/send", post(send_invoice))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint (no auth required)
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tradebill",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Auth middleware - validates Bearer token
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    // Skip auth for health check
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(token) = token else {
        return ApiError::Unauthorized("Missing or invalid Authorization header").into_response();
    };

    if !state.config.validate_token(token) {
        return ApiError::Unauthorized("Invalid API token").into_response();
    }

    next.run(request).await
}

async fn list_invoices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InvoiceSummary>>, ApiError> {
    let invoices = state.db.list_summaries()?;
    Ok(Json(invoices))
}

async fn get_invoice(
    State(state): State<Arc<AppState>>,
    InvoiceId(id): InvoiceId,
) -> Result<Json<Invoice>, ApiError> {
    let invoice = state.db.get_invoice(id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(invoice))
}

async fn create_invoice(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<InvoicePayload>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    payload.validate()?;

    let invoice = state.db.create_invoice(&payload)?;

    tracing::info!(
        invoice_id = invoice.id,
        trade_type = %invoice.trade_type,
        total = %invoice.totals.total,
        "Invoice created"
    );

    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn update_invoice(
    State(state): State<Arc<AppState>>,
    InvoiceId(id): InvoiceId,
    JsonBody(payload): JsonBody<InvoicePayload>,
) -> Result<Json<Invoice>, ApiError> {
    payload.validate()?;

    let invoice = state
        .db
        .update_draft(id, &payload)?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(invoice_id = id, total = %invoice.totals.total, "Invoice updated");

    Ok(Json(invoice))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    InvoiceId(id): InvoiceId,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> Result<Json<Invoice>, ApiError> {
    let invoice = state
        .db
        .change_status(id, update.status)?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(invoice_id = id, status = %invoice.status, "Invoice status changed");

    Ok(Json(invoice))
}

async fn send_invoice(
    State(state): State<Arc<AppState>>,
    InvoiceId(id): InvoiceId,
) -> Result<Json<Invoice>, ApiError> {
    let pdf_url = delivery::pdf_url(&state.config.delivery, id);
    let invoice = state
        .db
        .send_invoice(id, &pdf_url)?
        .ok_or(ApiError::NotFound)?;

    delivery::dispatch(&invoice, &pdf_url);

    tracing::info!(invoice_id = id, "Invoice sent");

    Ok(Json(invoice))
}

#[derive(Debug, Deserialize)]
struct ComplianceQuery {
    trade_type: TradeType,
}

async fn compliance_notes(
    QueryParams(query): QueryParams<ComplianceQuery>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "trade_type": query.trade_type,
        "compliance_notes": delivery::compliance_notes(query.trade_type),
    }))
}

/// JSON request body whose rejection is reported as an [`ApiError`]
struct JsonBody<T>(T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.status(), e.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// The `{id}` path segment
struct InvoiceId(i64);

impl<S> FromRequestParts<S> for InvoiceId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.status(), e.body_text()))?;
        Ok(InvoiceId(id))
    }
}

/// Query string whose rejection is reported as an [`ApiError`]
struct QueryParams<T>(T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.status(), e.body_text()))?;
        Ok(QueryParams(value))
    }
}

/// API error type
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str),
    NotFound,
    BadRequest(StatusCode, String),
    Invalid(ValidationError),
    Conflict(TransitionError),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Invoice not found".to_string()),
            ApiError::BadRequest(status, message) => (status, message),
            ApiError::Invalid(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            ApiError::Conflict(err) => (StatusCode::CONFLICT, err.to_string()),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "API error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Transition errors raised inside a database transaction surface as 409.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TransitionError>() {
            Ok(transition) => Self::Conflict(transition),
            Err(err) => Self::Internal(err),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Invalid(err)
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        Self::Conflict(err)
    }
}
