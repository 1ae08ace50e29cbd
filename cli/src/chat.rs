use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Local,
  Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
  pub id: Uuid,
  pub text: String,
  pub direction: Direction,
  pub at: DateTime<Utc>,
}

impl ChatMessage {
  pub fn local(text: impl Into<String>) -> Self {
    Self::new(text.into(), Direction::Local)
  }

  pub fn remote(text: impl Into<String>) -> Self {
    Self::new(text.into(), Direction::Remote)
  }

  fn new(text: String, direction: Direction) -> Self {
    Self {
      id: Uuid::new_v4(),
      text,
      direction,
      at: Utc::now(),
    }
  }
}

/// Data channel framing for one chat message.
#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
  text: &'a str,
}

/// Inbound framing; older peers send `message` instead of `text`.
#[derive(Debug, Deserialize)]
struct InboundPayload {
  text: Option<String>,
  message: Option<String>,
}

pub fn encode_payload(text: &str) -> SessionResult<String> {
  serde_json::to_string(&ChatPayload { text }).map_err(|err| SessionError::MalformedEnvelope(err.to_string()))
}

pub fn decode_payload(payload: &[u8]) -> SessionResult<String> {
  let payload: InboundPayload =
    serde_json::from_slice(payload).map_err(|err| SessionError::MalformedEnvelope(err.to_string()))?;
  payload
    .text
    .or(payload.message)
    .ok_or_else(|| SessionError::MalformedEnvelope("payload has no text".to_string()))
}

/// Text a user can actually send: anything but empty or whitespace.
pub fn is_sendable(text: &str) -> bool {
  !text.trim().is_empty()
}
