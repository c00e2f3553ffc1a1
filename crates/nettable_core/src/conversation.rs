//! crates/nettable_core/src/conversation.rs
//!
//! The per-user state machine that walks a user through the fields of one
//! table row, validates every answer and hands a complete row back to the
//! caller for committing.
//!
//! A `Session` only ever rests in `Idle`, `Filling` or `Confirming`. The
//! `Committed` and `Cancelled` states of a fill are reported as an `Outcome`
//! and collapse back to `Idle` within the same step.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::domain::{Draft, Field, NewRow, UserId, ABSENT};
use crate::error::ConversationError;

//=========================================================================================
// Events and States
//=========================================================================================

/// Everything a user can do to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    FieldInput(String),
    Skip,
    Confirm,
    /// Re-answer the field with this index from the confirmation screen.
    Edit(usize),
    Cancel,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::FieldInput(_) => "field_input",
            Event::Skip => "skip",
            Event::Confirm => "confirm",
            Event::Edit(_) => "edit",
            Event::Cancel => "cancel",
        }
    }
}

/// The externally visible state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsmState {
    Idle,
    AwaitingField(Field),
    Confirming,
}

impl FsmState {
    pub fn name(&self) -> &'static str {
        match self {
            FsmState::Idle => "idle",
            FsmState::AwaitingField(_) => "awaiting_field",
            FsmState::Confirming => "confirming",
        }
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsmState::Idle => f.write_str("no row is being filled"),
            FsmState::AwaitingField(field) => write!(f, "waiting for {}", field.label()),
            FsmState::Confirming => f.write_str("waiting for confirmation"),
        }
    }
}

/// What a single step did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Advanced,
    Rejected,
    Committed,
    Cancelled,
}

impl Outcome {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Advanced => "advanced",
            Outcome::Rejected => "rejected",
            Outcome::Committed => "committed",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// Where the draft lives. A draft exists only while a row is being filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Filling { draft: Draft, awaiting: Field },
    Confirming { draft: Draft },
}

impl Phase {
    pub fn state(&self) -> FsmState {
        match self {
            Phase::Idle => FsmState::Idle,
            Phase::Filling { awaiting, .. } => FsmState::AwaitingField(*awaiting),
            Phase::Confirming { .. } => FsmState::Confirming,
        }
    }
}

/// Result of feeding one event to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The session moved (or stayed) and has something to tell the user.
    Reply { outcome: Outcome, message: String },
    /// The draft is complete and confirmed. The caller must store the row and
    /// then call [`Session::complete_commit`]; until then the session stays in
    /// `Confirming`.
    Commit(NewRow),
}

//=========================================================================================
// Session
//=========================================================================================

/// The live conversation of one user.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            phase: Phase::Idle,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn state(&self) -> FsmState {
        self.phase.state()
    }

    pub fn draft(&self) -> Option<&Draft> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Filling { draft, .. } | Phase::Confirming { draft } => Some(draft),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.last_activity + timeout < now
    }

    /// The prompt that tells the user what the session is waiting for.
    pub fn expected_action(&self) -> String {
        match &self.phase {
            Phase::Idle => "Send start to fill a new row.".to_string(),
            Phase::Filling { awaiting, .. } => {
                let mut prompt = awaiting.prompt().to_string();
                prompt.push_str(" Send cancel to abandon this row.");
                prompt
            }
            Phase::Confirming { .. } => {
                "Send confirm to save the row, edit <number> to change a field, or cancel."
                    .to_string()
            }
        }
    }

    /// Applies one event. On error the session is left exactly as it was,
    /// except for an invariant violation, which resets it to `Idle`.
    pub fn handle(&mut self, event: Event, now: DateTime<Utc>) -> Result<Step, ConversationError> {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);

        let (next, result) = match (phase, event) {
            (Phase::Idle, Event::Start) => {
                let draft = Draft::new();
                info!(user_id = %self.user_id, draft_id = %draft.id, "Starting a new row");
                let message = format!("Filling a new row.\n{}", Field::FIRST.prompt());
                (
                    Phase::Filling {
                        draft,
                        awaiting: Field::FIRST,
                    },
                    Ok(reply(Outcome::Advanced, message)),
                )
            }

            (Phase::Filling { mut draft, awaiting }, Event::FieldInput(text)) => {
                match awaiting.validate(&text) {
                    Ok(value) => {
                        draft.set(awaiting, value);
                        advance(draft)
                    }
                    Err(err) => (Phase::Filling { draft, awaiting }, Err(err)),
                }
            }

            (Phase::Filling { mut draft, awaiting }, Event::Skip) => {
                if awaiting.is_skippable() {
                    draft.set(awaiting, ABSENT.to_string());
                    advance(draft)
                } else {
                    let err = ConversationError::Validation {
                        field: Some(awaiting),
                        reason: format!("{} cannot be skipped", awaiting.label()),
                    };
                    (Phase::Filling { draft, awaiting }, Err(err))
                }
            }

            (Phase::Filling { draft, .. }, Event::Cancel)
            | (Phase::Confirming { draft }, Event::Cancel) => {
                info!(user_id = %self.user_id, draft_id = %draft.id, "Row cancelled by user");
                (
                    Phase::Idle,
                    Ok(reply(Outcome::Cancelled, "Filling cancelled. Nothing was saved.")),
                )
            }

            (Phase::Confirming { draft }, Event::Confirm) => {
                match draft.to_new_row(&self.user_id, now) {
                    Ok(row) => (Phase::Confirming { draft }, Ok(Step::Commit(row))),
                    Err(err) => (Phase::Idle, Err(err)),
                }
            }

            (Phase::Confirming { draft }, Event::Edit(index)) => match Field::from_index(index) {
                Some(field) => {
                    let message = format!(
                        "Editing {} (currently: {}).\n{}",
                        field.label(),
                        draft.value(field).unwrap_or("-"),
                        field.prompt()
                    );
                    (
                        Phase::Filling {
                            draft,
                            awaiting: field,
                        },
                        Ok(reply(Outcome::Advanced, message)),
                    )
                }
                None => {
                    let err = ConversationError::Validation {
                        field: None,
                        reason: format!(
                            "there is no field number {}, pick one between 0 and {}",
                            index,
                            Field::ALL.len() - 1
                        ),
                    };
                    (Phase::Confirming { draft }, Err(err))
                }
            },

            (phase, event) => {
                let err = ConversationError::UnknownSessionEvent {
                    state: phase.state(),
                    event: event.kind(),
                };
                (phase, Err(err))
            }
        };

        self.phase = next;
        result
    }

    /// Finishes a commit after the table store accepted the row.
    pub fn complete_commit(&mut self) -> Option<Draft> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Confirming { draft } => Some(draft),
            other => {
                self.phase = other;
                None
            }
        }
    }

    /// Forced timeout transition. Returns the discarded draft, if any.
    pub fn expire(&mut self) -> Option<Draft> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => None,
            Phase::Filling { draft, .. } | Phase::Confirming { draft } => Some(draft),
        }
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}

fn reply(outcome: Outcome, message: impl Into<String>) -> Step {
    Step::Reply {
        outcome,
        message: message.into(),
    }
}

/// Moves to the first unanswered field, or to confirmation once none is left.
fn advance(draft: Draft) -> (Phase, Result<Step, ConversationError>) {
    match draft.first_missing() {
        Some(next) => (
            Phase::Filling {
                draft,
                awaiting: next,
            },
            Ok(reply(Outcome::Advanced, next.prompt())),
        ),
        None => {
            let message = format!(
                "Please check the row:\n{}\n\nSend confirm to save it, edit <number> to change a field, or cancel.",
                draft.summary()
            );
            (Phase::Confirming { draft }, Ok(reply(Outcome::Advanced, message)))
        }
    }
}
