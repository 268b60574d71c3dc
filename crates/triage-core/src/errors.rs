/// Rejection reasons for real-time channel frames.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("invalid case id: {0}")]
    InvalidCaseId(String),

    #[error("invalid {event} payload: {reason}")]
    InvalidPayload { event: &'static str, reason: String },
}
