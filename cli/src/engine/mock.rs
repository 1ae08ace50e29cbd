//! Recording engine double for state machine and session tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ChannelHandle, PeerEngine};
use crate::error::{SessionError, SessionResult};
use crate::signaling::{IceCandidate, SessionDescription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
  CreateOffer,
  CreateAnswer,
  SetLocal(SessionDescription),
  SetRemote(SessionDescription),
  AddCandidate(IceCandidate),
  CreateDataChannel(String),
  Close,
}

#[derive(Default)]
pub struct MockEngine {
  calls: Mutex<Vec<EngineCall>>,
  remote_set: Mutex<bool>,
  fail_answer: bool,
  reject_candidates: bool,
  channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockEngine {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn failing_answer() -> Arc<Self> {
    Arc::new(Self {
      fail_answer: true,
      ..Default::default()
    })
  }

  pub fn rejecting_candidates() -> Arc<Self> {
    Arc::new(Self {
      reject_candidates: true,
      ..Default::default()
    })
  }

  pub async fn calls(&self) -> Vec<EngineCall> {
    self.calls.lock().await.clone()
  }

  pub async fn applied_candidates(&self) -> Vec<IceCandidate> {
    self
      .calls()
      .await
      .into_iter()
      .filter_map(|call| match call {
        EngineCall::AddCandidate(candidate) => Some(candidate),
        _ => None,
      })
      .collect()
  }

  pub async fn channel(&self, index: usize) -> Option<Arc<MockChannel>> {
    self.channels.lock().await.get(index).cloned()
  }

  async fn record(&self, call: EngineCall) {
    self.calls.lock().await.push(call);
  }
}

#[async_trait]
impl PeerEngine for MockEngine {
  async fn create_offer(&self) -> SessionResult<SessionDescription> {
    self.record(EngineCall::CreateOffer).await;
    Ok(SessionDescription::offer("mock-offer"))
  }

  async fn create_answer(&self) -> SessionResult<SessionDescription> {
    self.record(EngineCall::CreateAnswer).await;
    if self.fail_answer {
      return Err(SessionError::EngineFailure("answer rejected".to_string()));
    }
    Ok(SessionDescription::answer("mock-answer"))
  }

  async fn set_local_description(&self, desc: SessionDescription) -> SessionResult<()> {
    self.record(EngineCall::SetLocal(desc)).await;
    Ok(())
  }

  async fn set_remote_description(&self, desc: SessionDescription) -> SessionResult<()> {
    self.record(EngineCall::SetRemote(desc)).await;
    *self.remote_set.lock().await = true;
    Ok(())
  }

  async fn add_ice_candidate(&self, candidate: IceCandidate) -> SessionResult<()> {
    self.record(EngineCall::AddCandidate(candidate)).await;
    if !*self.remote_set.lock().await {
      return Err(SessionError::EngineFailure("remote description not set".to_string()));
    }
    if self.reject_candidates {
      return Err(SessionError::EngineFailure("candidate rejected".to_string()));
    }
    Ok(())
  }

  async fn create_data_channel(&self, label: &str) -> SessionResult<Arc<dyn ChannelHandle>> {
    self.record(EngineCall::CreateDataChannel(label.to_string())).await;
    let channel = MockChannel::new(label);
    self.channels.lock().await.push(channel.clone());
    Ok(channel as Arc<dyn ChannelHandle>)
  }

  async fn close(&self) -> SessionResult<()> {
    self.record(EngineCall::Close).await;
    Ok(())
  }
}

pub struct MockChannel {
  label: String,
  sent: Mutex<Vec<String>>,
  closed: Mutex<bool>,
}

impl MockChannel {
  pub fn new(label: &str) -> Arc<Self> {
    Arc::new(Self {
      label: label.to_string(),
      sent: Mutex::new(Vec::new()),
      closed: Mutex::new(false),
    })
  }

  pub async fn sent(&self) -> Vec<String> {
    self.sent.lock().await.clone()
  }

  pub async fn is_closed(&self) -> bool {
    *self.closed.lock().await
  }
}

#[async_trait]
impl ChannelHandle for MockChannel {
  fn label(&self) -> String {
    self.label.clone()
  }

  async fn send_text(&self, text: String) -> SessionResult<()> {
    self.sent.lock().await.push(text);
    Ok(())
  }

  async fn close(&self) -> SessionResult<()> {
    *self.closed.lock().await = true;
    Ok(())
  }
}
