//! Two-party text chat over a WebRTC data channel, bootstrapped through a
//! relay-only WebSocket signaling endpoint.

pub mod channel;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod negotiation;
pub mod session;
pub mod signaling;

pub use config::{Role, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use session::{ChatSession, ChatSessionHandle, SessionEvent};
