//! Seam between the negotiation core and the WebRTC engine that actually
//! implements ICE, DTLS and SCTP.

#[cfg(test)]
pub mod mock;
pub mod rtc;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SessionResult;
use crate::signaling::{IceCandidate, SessionDescription};

pub use rtc::RtcEngine;

#[async_trait]
pub trait PeerEngine: Send + Sync {
  async fn create_offer(&self) -> SessionResult<SessionDescription>;
  async fn create_answer(&self) -> SessionResult<SessionDescription>;
  async fn set_local_description(&self, desc: SessionDescription) -> SessionResult<()>;
  async fn set_remote_description(&self, desc: SessionDescription) -> SessionResult<()>;
  async fn add_ice_candidate(&self, candidate: IceCandidate) -> SessionResult<()>;
  async fn create_data_channel(&self, label: &str) -> SessionResult<Arc<dyn ChannelHandle>>;
  async fn close(&self) -> SessionResult<()>;
}

#[async_trait]
pub trait ChannelHandle: Send + Sync {
  fn label(&self) -> String;
  async fn send_text(&self, text: String) -> SessionResult<()>;
  async fn close(&self) -> SessionResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  New,
  Connecting,
  Connected,
  Disconnected,
  Failed,
  Closed,
}

/// Callback surface of the engine, flattened into one ordered stream.
pub enum EngineEvent {
  LocalCandidate(IceCandidate),
  RemoteChannel(Arc<dyn ChannelHandle>),
  ChannelOpen { label: String },
  ChannelMessage { label: String, payload: Bytes },
  ChannelClosed { label: String },
  ConnectionState(ConnectionState),
}

impl fmt::Debug for EngineEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EngineEvent::LocalCandidate(candidate) => f.debug_tuple("LocalCandidate").field(candidate).finish(),
      EngineEvent::RemoteChannel(channel) => f.debug_tuple("RemoteChannel").field(&channel.label()).finish(),
      EngineEvent::ChannelOpen { label } => f.debug_struct("ChannelOpen").field("label", label).finish(),
      EngineEvent::ChannelMessage { label, payload } => f
        .debug_struct("ChannelMessage")
        .field("label", label)
        .field("len", &payload.len())
        .finish(),
      EngineEvent::ChannelClosed { label } => f.debug_struct("ChannelClosed").field("label", label).finish(),
      EngineEvent::ConnectionState(state) => f.debug_tuple("ConnectionState").field(state).finish(),
    }
  }
}
