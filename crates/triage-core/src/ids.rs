use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::ChannelError;

/// Server-assigned identifier for one live WebSocket connection.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque case identifier supplied by clients.
///
/// Clients send either a string (`"123"`) or a bare number (`123`); both name
/// the same room, so the id is normalized to its textual form.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub struct CaseId(String);

impl CaseId {
    pub fn new(s: impl Into<String>) -> Result<Self, ChannelError> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(ChannelError::InvalidCaseId("case id must not be empty".into()));
        }
        Ok(Self(s))
    }

    /// Accepts a JSON string or number.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ChannelError> {
        match value {
            serde_json::Value::String(s) => Self::new(s.as_str()),
            serde_json::Value::Number(n) => Self::new(n.to_string()),
            serde_json::Value::Null => Err(ChannelError::InvalidCaseId("case id is missing".into())),
            other => Err(ChannelError::InvalidCaseId(format!(
                "case id must be a string or number, got {}",
                json_kind(other)
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<serde_json::Value> for CaseId {
    type Error = ChannelError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<CaseId> for String {
    fn from(id: CaseId) -> Self {
        id.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
