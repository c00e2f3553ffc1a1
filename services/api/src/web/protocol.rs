//! services/api/src/web/protocol.rs
//!
//! Defines the JSON protocol between a chat front-end and the API server.
//! The front-end resolves who sent a message or pressed a button and forwards
//! it here as an `EventRequest`; the reply text is sent back to the chat.

use chrono::{DateTime, Utc};
use nettable_core::conversation::{Event, FsmState, Session};
use nettable_core::domain::{Field, Row};
use nettable_core::error::ConversationError;
use nettable_core::registry::TransitionResult;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

//=========================================================================================
// Messages Sent FROM the Chat Front-end TO the Server
//=========================================================================================

/// One user action, already stripped of any chat-platform specifics.
#[derive(Deserialize, Debug, ToSchema)]
pub struct EventRequest {
    /// Opaque identifier of the chat user.
    pub user_id: String,
    pub event_kind: EventKind,
    /// The typed text, for `field_input` events.
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Begin filling a new row.
    Start,
    /// Answer the field currently asked for.
    FieldInput,
    /// Leave an optional field empty.
    Skip,
    /// Save the collected row.
    Confirm,
    /// Go back to one field from the confirmation screen.
    Edit { field_index: usize },
    /// Abandon the current row.
    Cancel,
}

impl EventRequest {
    pub fn to_event(&self) -> Event {
        match &self.event_kind {
            EventKind::Start => Event::Start,
            EventKind::FieldInput => Event::FieldInput(self.payload.clone().unwrap_or_default()),
            EventKind::Skip => Event::Skip,
            EventKind::Confirm => Event::Confirm,
            EventKind::Edit { field_index } => Event::Edit(*field_index),
            EventKind::Cancel => Event::Cancel,
        }
    }
}

/// Query string of the table search endpoint.
#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Field name: ssid, address, gateway, password or note.
    pub field: String,
    pub value: String,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Chat Front-end
//=========================================================================================

/// The answer to every event.
#[derive(Serialize, Debug, ToSchema)]
pub struct TransitionResponse {
    /// idle, awaiting_field or confirming.
    pub state: String,
    /// Name of the field being asked for, when `state` is awaiting_field.
    pub awaiting_field: Option<String>,
    /// advanced, rejected, committed or cancelled.
    pub outcome: String,
    /// Text to show the user.
    pub message: String,
    pub committed_row: Option<RowResponse>,
    pub error: Option<ErrorResponse>,
}

impl From<TransitionResult> for TransitionResponse {
    fn from(result: TransitionResult) -> Self {
        Self {
            state: result.state.name().to_string(),
            awaiting_field: awaiting_field(result.state),
            outcome: result.outcome.name().to_string(),
            message: result.message,
            committed_row: result.committed_row.map(RowResponse::from),
            error: result.error.as_ref().map(ErrorResponse::from),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorResponse {
    /// validation_error, unknown_session_event, storage_failure or invariant_violation.
    pub kind: String,
    pub retryable: bool,
}

impl From<&ConversationError> for ErrorResponse {
    fn from(error: &ConversationError) -> Self {
        Self {
            kind: error.kind().to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// One committed row. `fields` keeps the table's column order.
#[derive(Serialize, Debug, ToSchema)]
pub struct RowResponse {
    pub id: i64,
    pub user_id: String,
    pub fields: Vec<FieldValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct FieldValue {
    pub name: String,
    pub label: String,
    pub value: String,
}

impl From<Row> for RowResponse {
    fn from(row: Row) -> Self {
        let fields = Field::ALL
            .iter()
            .map(|field| FieldValue {
                name: field.name().to_string(),
                label: field.label().to_string(),
                value: row.value(*field).unwrap_or_default().to_string(),
            })
            .collect();
        Self {
            id: row.id.0,
            user_id: row.user_id.to_string(),
            fields,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SessionResponse {
    pub user_id: String,
    pub state: String,
    pub awaiting_field: Option<String>,
    /// The prompt for what the session is waiting for.
    pub expected_action: String,
    pub last_activity: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            user_id: session.user_id.to_string(),
            state: session.state().name().to_string(),
            awaiting_field: awaiting_field(session.state()),
            expected_action: session.expected_action(),
            last_activity: session.last_activity,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
}

fn awaiting_field(state: FsmState) -> Option<String> {
    match state {
        FsmState::AwaitingField(field) => Some(field.name().to_string()),
        FsmState::Idle | FsmState::Confirming => None,
    }
}
