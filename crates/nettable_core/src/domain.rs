//! crates/nettable_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ConversationError;

/// Value stored for a field the user chose to skip.
pub const ABSENT: &str = "absent";

/// Longest SSID allowed by 802.11, in bytes.
const MAX_SSID_BYTES: usize = 32;

//=========================================================================================
// Fields
//=========================================================================================

/// The columns of the network table, in the order a user is asked for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Ssid,
    Address,
    Gateway,
    Password,
    Note,
}

impl Field {
    /// Every field, in fill order.
    pub const ALL: [Field; 5] = [
        Field::Ssid,
        Field::Address,
        Field::Gateway,
        Field::Password,
        Field::Note,
    ];

    pub const FIRST: Field = Field::Ssid;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Field> {
        Self::ALL.get(index).copied()
    }

    /// Machine name, also used as the storage column name.
    pub fn name(self) -> &'static str {
        match self {
            Field::Ssid => "ssid",
            Field::Address => "address",
            Field::Gateway => "gateway",
            Field::Password => "password",
            Field::Note => "note",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Ssid => "Network name (SSID)",
            Field::Address => "IP address",
            Field::Gateway => "Default gateway",
            Field::Password => "Password protected",
            Field::Note => "Note",
        }
    }

    /// The question shown to the user when this field is awaited.
    pub fn prompt(self) -> &'static str {
        match self {
            Field::Ssid => "Enter the network name (SSID).",
            Field::Address => "Enter the IP address.",
            Field::Gateway => "Enter the default gateway, or send skip.",
            Field::Password => "Is the network password protected? Answer yes or no.",
            Field::Note => "Enter a note, or send skip.",
        }
    }

    pub fn is_skippable(self) -> bool {
        matches!(self, Field::Gateway | Field::Note)
    }

    /// Checks a raw answer and returns the value to store.
    pub fn validate(self, input: &str) -> Result<String, ConversationError> {
        let value = input.trim();
        if value.is_empty() {
            return Err(self.invalid("the value must not be empty"));
        }

        match self {
            Field::Ssid => {
                if value.len() > MAX_SSID_BYTES {
                    return Err(self.invalid("an SSID is at most 32 bytes long"));
                }
                Ok(value.to_string())
            }
            Field::Address | Field::Gateway => value
                .parse::<IpAddr>()
                .map(|ip| ip.to_string())
                .map_err(|_| self.invalid("expected an IPv4 or IPv6 address")),
            Field::Password => match value.to_lowercase().as_str() {
                "yes" => Ok("yes".to_string()),
                "no" => Ok("no".to_string()),
                _ => Err(self.invalid("answer yes or no")),
            },
            Field::Note => Ok(value.to_string()),
        }
    }

    fn invalid(self, reason: &str) -> ConversationError {
        ConversationError::Validation {
            field: Some(self),
            reason: format!("{}: {}", self.label(), reason),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown field: {0}")]
pub struct UnknownField(pub String);

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

//=========================================================================================
// Identifiers
//=========================================================================================

/// Opaque identifier of a chat user / conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier assigned to a row by the table store. Strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//=========================================================================================
// Rows
//=========================================================================================

/// A committed, immutable entry of the network table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: RowId,
    pub user_id: UserId,
    pub fields: BTreeMap<Field, String>,
    pub created_at: DateTime<Utc>,
}

impl Row {
    pub fn value(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Case-insensitive comparison of one field against `value`.
    pub fn matches(&self, field: Field, value: &str) -> bool {
        self.value(field)
            .is_some_and(|v| v.to_lowercase() == value.trim().to_lowercase())
    }
}

/// A complete row that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow {
    pub user_id: UserId,
    pub fields: BTreeMap<Field, String>,
    pub created_at: DateTime<Utc>,
}

impl NewRow {
    pub fn into_row(self, id: RowId) -> Row {
        Row {
            id,
            user_id: self.user_id,
            fields: self.fields,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// Drafts
//=========================================================================================

/// A row under construction, owned by exactly one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub id: Uuid,
    values: BTreeMap<Field, String>,
}

impl Draft {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            values: BTreeMap::new(),
        }
    }

    pub fn value(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<Field, String> {
        &self.values
    }

    pub fn set(&mut self, field: Field, value: String) {
        self.values.insert(field, value);
    }

    /// The earliest field, in fill order, that has no value yet.
    pub fn first_missing(&self) -> Option<Field> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| self.value(*field).map_or(true, str::is_empty))
    }

    /// Freezes the draft into a row ready for the table store.
    pub fn to_new_row(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<NewRow, ConversationError> {
        if let Some(missing) = self.first_missing() {
            return Err(ConversationError::InvariantViolation {
                reason: format!("draft {} is missing the '{}' field", self.id, missing),
            });
        }
        Ok(NewRow {
            user_id: user_id.clone(),
            fields: self.values.clone(),
            created_at: now,
        })
    }

    /// Numbered listing of the collected values, used on the confirmation screen.
    pub fn summary(&self) -> String {
        Field::ALL
            .iter()
            .map(|field| {
                format!(
                    "{}. {}: {}",
                    field.index(),
                    field.label(),
                    self.value(*field).unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Draft {
    fn default() -> Self {
        Self::new()
    }
}
