//! Live case collaboration over WebSocket.

pub mod access;
pub mod channel;
pub mod registry;
pub mod rooms;
pub mod socket;

pub use access::{CaseAccess, CaseAction, ConnectionInfo, OpenCaseAccess};
pub use channel::CaseChannel;
pub use registry::ClientRegistry;
pub use rooms::CaseRooms;
pub use socket::{ws_handler, SocketState, WS_PATH};
