use thiserror::Error;

use crate::negotiation::NegotiationState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
  #[error("signaling link unavailable: {0}")]
  TransportUnavailable(String),
  #[error("malformed envelope: {0}")]
  MalformedEnvelope(String),
  #[error("cannot handle {event} while {state}")]
  InvalidStateTransition {
    state: NegotiationState,
    event: &'static str,
  },
  #[error("engine failure: {0}")]
  EngineFailure(String),
  #[error("data channel is not open")]
  ChannelNotReady,
  #[error("invalid configuration: {0}")]
  Config(String),
}

impl From<webrtc::Error> for SessionError {
  fn from(err: webrtc::Error) -> Self {
    SessionError::EngineFailure(err.to_string())
  }
}

pub type SessionResult<T> = Result<T, SessionError>;
