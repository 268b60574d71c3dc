pub mod errors;
pub mod events;
pub mod ids;
pub mod mode;

pub use errors::ChannelError;
pub use events::{CasePayload, ClientEvent, ServerEvent};
pub use ids::{CaseId, ClientId};
pub use mode::RuntimeMode;
