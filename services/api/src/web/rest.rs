//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::protocol::{
    ErrorResponse, EventKind, EventRequest, FieldValue, HealthResponse, RowResponse, SearchQuery,
    SessionResponse, TransitionResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use nettable_core::domain::{Field, UserId};
use nettable_core::ports::PortError;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        post_event_handler,
        get_session_handler,
        list_rows_handler,
        search_rows_handler,
        health_handler,
    ),
    components(
        schemas(
            EventRequest,
            EventKind,
            TransitionResponse,
            ErrorResponse,
            RowResponse,
            FieldValue,
            SessionResponse,
            HealthResponse
        )
    ),
    tags(
        (name = "Network Table API", description = "Conversational row filling and table browsing.")
    )
)]
pub struct ApiDoc;

type HandlerError = (StatusCode, String);

fn port_error_response(e: PortError) -> HandlerError {
    error!("Table store error: {:?}", e);
    match e {
        PortError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "The table is temporarily unavailable".to_string(),
        ),
        PortError::Unexpected(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read the table".to_string(),
        ),
    }
}

fn parse_user_id(raw: &str) -> Result<UserId, HandlerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "user_id must not be empty".to_string()));
    }
    Ok(UserId::new(trimmed))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Feed one chat event to the user's conversation.
///
/// Conversational errors (bad answers, unexpected buttons, a busy table) are
/// reported inside the response body with status 200.
#[utoipa::path(
    post,
    path = "/events",
    request_body = EventRequest,
    responses(
        (status = 200, description = "Event handled", body = TransitionResponse),
        (status = 400, description = "Bad request (e.g., empty user_id)")
    )
)]
pub async fn post_event_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<EventRequest>,
) -> Result<Json<TransitionResponse>, HandlerError> {
    let user_id = parse_user_id(&request.user_id)?;
    let event = request.to_event();

    let result = app_state.registry.advance(&user_id, event).await;
    if let Some(row) = &result.committed_row {
        info!(%user_id, row_id = %row.id, "Row committed through the API");
    }
    Ok(Json(TransitionResponse::from(result)))
}

/// Show where a user's conversation currently stands.
#[utoipa::path(
    get,
    path = "/sessions/{user_id}",
    params(
        ("user_id" = String, Path, description = "Opaque identifier of the chat user.")
    ),
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 400, description = "Bad request (e.g., empty user_id)")
    )
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SessionResponse>, HandlerError> {
    let user_id = parse_user_id(&user_id)?;
    let session = app_state.registry.get_or_create(&user_id).await;
    Ok(Json(SessionResponse::from(session)))
}

/// List every committed row in commit order.
#[utoipa::path(
    get,
    path = "/rows",
    responses(
        (status = 200, description = "The whole table", body = [RowResponse]),
        (status = 503, description = "Table store unavailable"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_rows_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<RowResponse>>, HandlerError> {
    let rows = app_state
        .store
        .read_all()
        .await
        .map_err(port_error_response)?;
    Ok(Json(rows.into_iter().map(RowResponse::from).collect()))
}

/// Find rows whose field equals a value, ignoring case.
#[utoipa::path(
    get,
    path = "/rows/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching rows", body = [RowResponse]),
        (status = 400, description = "Unknown field name"),
        (status = 503, description = "Table store unavailable"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn search_rows_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<RowResponse>>, HandlerError> {
    let field = query
        .field
        .parse::<Field>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let rows = app_state
        .store
        .find_by_field(field, &query.value)
        .await
        .map_err(port_error_response)?;
    Ok(Json(rows.into_iter().map(RowResponse::from).collect()))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_handler(State(app_state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: app_state.registry.active_sessions().await,
    })
}
