//! HTTP routes.
//!
//! - `GET /health`: liveness and the configured provider
//! - `POST /process-ticket`: classify one ticket and write the result back

use crate::config::Config;
use crate::error::{AppError, CLASSIFICATION_FAILED};
use crate::processor::TicketProcessor;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{HeaderValue, Method, header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use support_copilot_core::records::{RecordStore, RecordStoreError};
use support_copilot_core::ticket::{Category, Sentiment, TicketId};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shortest accepted description, after trimming
pub const MIN_DESCRIPTION_CHARS: usize = 3;
/// Longest accepted description, after trimming
pub const MAX_DESCRIPTION_CHARS: usize = 20_000;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Arc<Config>,
    /// Classifier
    pub processor: TicketProcessor,
    /// Ticket store written back to
    pub records: Arc<dyn RecordStore>,
}

/// Body of `POST /process-ticket`
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessTicketRequest {
    /// Ticket to classify, must be a UUID
    pub ticket_id: String,
    /// Text to classify
    pub description: String,
}

/// Response of `POST /process-ticket`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTicketResponse {
    /// Classified ticket
    pub ticket_id: String,
    /// Assigned category
    pub category: Category,
    /// Assigned sentiment
    pub sentiment: Sentiment,
    /// Always `true`
    pub processed: bool,
}

/// Response of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: String,
    /// Deployment environment
    pub environment: String,
    /// Configured model provider
    pub llm_provider: String,
}

/// Build the service router with CORS and request tracing
#[must_use]
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/process-ticket", post(process_ticket))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%origin, %error, "Ignoring invalid CORS origin");
                None
            },
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        environment: state.config.environment.clone(),
        llm_provider: state.config.llm.provider.clone(),
    })
}

/// Checks the request shape and returns the ticket id and trimmed text
fn validate(request: &ProcessTicketRequest) -> Result<(TicketId, &str), AppError> {
    let ticket_id = uuid::Uuid::parse_str(request.ticket_id.trim())
        .map_err(|_| AppError::validation("ticket_id must be a UUID"))?;

    let description = request.description.trim();
    if description.is_empty() {
        return Err(AppError::validation("description cannot be empty"));
    }
    let length = description.chars().count();
    if !(MIN_DESCRIPTION_CHARS..=MAX_DESCRIPTION_CHARS).contains(&length) {
        return Err(AppError::validation(format!(
            "description must be between {MIN_DESCRIPTION_CHARS} and {MAX_DESCRIPTION_CHARS} characters"
        )));
    }

    Ok((TicketId::new(ticket_id.to_string()), description))
}

fn outcome(result: &Result<Json<ProcessTicketResponse>, AppError>) -> &'static str {
    match result {
        Ok(_) => "processed",
        Err(error) if error.status().is_server_error() => "error",
        Err(error) if error.status() == http::StatusCode::NOT_FOUND => "not_found",
        Err(error) if error.code() == CLASSIFICATION_FAILED => "unclassified",
        Err(_) => "invalid",
    }
}

#[tracing::instrument(skip_all)]
async fn process_ticket(
    State(state): State<AppState>,
    payload: Result<Json<ProcessTicketRequest>, JsonRejection>,
) -> Result<Json<ProcessTicketResponse>, AppError> {
    let result = handle_process_ticket(&state, payload).await;
    metrics::counter!("classifier.requests.total", "outcome" => outcome(&result)).increment(1);
    result
}

async fn handle_process_ticket(
    state: &AppState,
    payload: Result<Json<ProcessTicketRequest>, JsonRejection>,
) -> Result<Json<ProcessTicketResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::validation(rejection.body_text()))?;
    let (ticket_id, description) = validate(&request)?;

    let classification = state
        .processor
        .classify(description)
        .await
        .map_err(|error| {
            tracing::warn!(ticket_id = %ticket_id, %error, "Classification failed");
            AppError::unprocessable("Ticket could not be processed")
        })?;

    state
        .records
        .mark_processed(ticket_id.clone(), classification)
        .await
        .map_err(|error| match error {
            RecordStoreError::NotFound(_) => AppError::not_found("Ticket not found"),
            other => AppError::internal("Internal service error").caused_by(other),
        })?;

    tracing::info!(
        ticket_id = %ticket_id,
        category = classification.category.label(),
        sentiment = classification.sentiment.label(),
        "Ticket processed"
    );

    Ok(Json(ProcessTicketResponse {
        ticket_id: ticket_id.to_string(),
        category: classification.category,
        sentiment: classification.sentiment,
        processed: true,
    }))
}
