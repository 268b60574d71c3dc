use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ChannelError;
use crate::ids::{json_kind, CaseId};

/// A case-scoped payload relayed to room members.
///
/// Must be a JSON object carrying a `caseId`; every other field is opaque and
/// echoed back unchanged, including the original `caseId` representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct CasePayload {
    case_id: CaseId,
    body: Map<String, Value>,
}

impl CasePayload {
    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    fn parse(event: &'static str, value: Value) -> Result<Self, ChannelError> {
        let Value::Object(body) = value else {
            return Err(ChannelError::InvalidPayload {
                event,
                reason: format!("expected an object, got {}", json_kind(&value)),
            });
        };
        let raw_id = body.get("caseId").ok_or_else(|| ChannelError::InvalidPayload {
            event,
            reason: "missing caseId".into(),
        })?;
        let case_id = CaseId::from_value(raw_id).map_err(|e| ChannelError::InvalidPayload {
            event,
            reason: e.to_string(),
        })?;
        Ok(Self { case_id, body })
    }
}

impl TryFrom<Value> for CasePayload {
    type Error = ChannelError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse("case", value)
    }
}

impl From<CasePayload> for Value {
    fn from(payload: CasePayload) -> Self {
        Value::Object(payload.body)
    }
}

/// Events a connected client may emit.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    JoinCase(CaseId),
    LeaveCase(CaseId),
    NewFinding(CasePayload),
    AnalysisProgress(CasePayload),
}

/// Wire envelope shared by both directions: `{"event": ..., "data": ...}`.
#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    pub const JOIN_CASE: &'static str = "joinCase";
    pub const LEAVE_CASE: &'static str = "leaveCase";
    pub const NEW_FINDING: &'static str = "newFinding";
    pub const ANALYSIS_PROGRESS: &'static str = "analysisProgress";

    /// Decode one text frame. Malformed frames are rejected, never forwarded.
    pub fn parse(text: &str) -> Result<Self, ChannelError> {
        let frame: Frame =
            serde_json::from_str(text).map_err(|e| ChannelError::MalformedFrame(e.to_string()))?;

        match frame.event.as_str() {
            Self::JOIN_CASE => Ok(Self::JoinCase(CaseId::from_value(&frame.data)?)),
            Self::LEAVE_CASE => Ok(Self::LeaveCase(CaseId::from_value(&frame.data)?)),
            Self::NEW_FINDING => Ok(Self::NewFinding(CasePayload::parse(
                Self::NEW_FINDING,
                frame.data,
            )?)),
            Self::ANALYSIS_PROGRESS => Ok(Self::AnalysisProgress(CasePayload::parse(
                Self::ANALYSIS_PROGRESS,
                frame.data,
            )?)),
            other => Err(ChannelError::UnknownEvent(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinCase(_) => Self::JOIN_CASE,
            Self::LeaveCase(_) => Self::LEAVE_CASE,
            Self::NewFinding(_) => Self::NEW_FINDING,
            Self::AnalysisProgress(_) => Self::ANALYSIS_PROGRESS,
        }
    }

    pub fn case_id(&self) -> &CaseId {
        match self {
            Self::JoinCase(id) | Self::LeaveCase(id) => id,
            Self::NewFinding(p) | Self::AnalysisProgress(p) => p.case_id(),
        }
    }
}

/// Events the server pushes to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    FindingAdded(CasePayload),
    ProgressUpdate(CasePayload),
    Error { message: String },
}

impl ServerEvent {
    /// Relay form of a client publication; `None` for membership events.
    pub fn relay_of(event: &ClientEvent) -> Option<Self> {
        match event {
            ClientEvent::NewFinding(p) => Some(Self::FindingAdded(p.clone())),
            ClientEvent::AnalysisProgress(p) => Some(Self::ProgressUpdate(p.clone())),
            ClientEvent::JoinCase(_) | ClientEvent::LeaveCase(_) => None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
