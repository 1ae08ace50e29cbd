use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::engine::ChannelHandle;
use crate::error::{SessionError, SessionResult};

/// Owns the application data channel: created locally by the offering side,
/// announced by the engine on the answering side.
#[derive(Default)]
pub struct DataChannelManager {
  channel: Option<Arc<dyn ChannelHandle>>,
  open: bool,
  closed: bool,
}

impl DataChannelManager {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn attach(&mut self, channel: Arc<dyn ChannelHandle>) {
    if self.closed {
      return;
    }
    if let Some(current) = self.channel.as_ref() {
      warn!(current = %current.label(), ignored = %channel.label(), "data channel already attached");
      return;
    }
    debug!(label = %channel.label(), "data channel attached");
    self.channel = Some(channel);
  }

  pub fn label(&self) -> Option<String> {
    self.channel.as_ref().map(|channel| channel.label())
  }

  pub fn is_open(&self) -> bool {
    self.open && !self.closed
  }

  /// Returns true when this call opened the channel.
  pub fn on_open(&mut self, label: &str) -> bool {
    if self.closed || self.open || !self.owns(label) {
      return false;
    }
    info!(label, "data channel open");
    self.open = true;
    true
  }

  /// Passes a payload through when it belongs to the attached channel.
  pub fn on_message(&self, label: &str, payload: Bytes) -> Option<Bytes> {
    if self.closed || !self.owns(label) {
      debug!(label, "dropping payload for unknown channel");
      return None;
    }
    Some(payload)
  }

  pub fn on_closed(&mut self, label: &str) {
    if self.owns(label) && self.open {
      info!(label, "data channel closed by peer");
      self.open = false;
    }
  }

  pub async fn send(&self, payload: String) -> SessionResult<()> {
    if self.closed {
      return Ok(());
    }
    match self.channel.as_ref() {
      Some(channel) if self.open => channel.send_text(payload).await,
      _ => Err(SessionError::ChannelNotReady),
    }
  }

  pub async fn close(&mut self) {
    if self.closed {
      return;
    }
    self.closed = true;
    self.open = false;
    if let Some(channel) = self.channel.take() {
      if let Err(err) = channel.close().await {
        warn!(error = %err, "data channel close failed");
      }
    }
  }

  fn owns(&self, label: &str) -> bool {
    self.channel.as_ref().is_some_and(|channel| channel.label() == label)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::mock::MockChannel;

  #[tokio::test]
  async fn send_requires_open() {
    let channel = MockChannel::new("chat");
    let mut manager = DataChannelManager::new();
    assert_eq!(manager.send("early".to_string()).await, Err(SessionError::ChannelNotReady));

    manager.attach(channel.clone());
    assert_eq!(manager.send("early".to_string()).await, Err(SessionError::ChannelNotReady));

    assert!(manager.on_open("chat"));
    assert!(!manager.on_open("chat"));
    manager.send("hello".to_string()).await.expect("send");
    assert_eq!(channel.sent().await, vec!["hello".to_string()]);

    manager.on_closed("chat");
    assert_eq!(manager.send("gone".to_string()).await, Err(SessionError::ChannelNotReady));
  }

  #[tokio::test]
  async fn ignores_foreign_channels() {
    let mut manager = DataChannelManager::new();
    manager.attach(MockChannel::new("chat"));
    manager.attach(MockChannel::new("other"));
    assert_eq!(manager.label().as_deref(), Some("chat"));
    assert!(!manager.on_open("other"));
    assert!(manager.on_message("other", Bytes::from_static(b"x")).is_none());
    assert_eq!(
      manager.on_message("chat", Bytes::from_static(b"x")),
      Some(Bytes::from_static(b"x"))
    );
  }

  #[tokio::test]
  async fn close_turns_everything_into_no_ops() {
    let channel = MockChannel::new("chat");
    let mut manager = DataChannelManager::new();
    manager.attach(channel.clone());
    manager.on_open("chat");
    manager.close().await;

    assert!(channel.is_closed().await);
    assert!(!manager.is_open());
    manager.send("late".to_string()).await.expect("no-op");
    assert!(channel.sent().await.is_empty());
    manager.close().await;
  }
}
