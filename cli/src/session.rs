//! ChatSession: one negotiation, one relay link, one data channel.
//!
//! All inputs (UI commands, relay frames, engine callbacks, the handshake
//! deadline) are funneled into a single task and handled strictly one at a
//! time, so negotiation steps never interleave. Inputs that arrive while an
//! engine step is pending wait in their channels.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::channel::DataChannelManager;
use crate::chat::{self, ChatMessage};
use crate::config::{Role, SessionConfig};
use crate::engine::{EngineEvent, PeerEngine};
use crate::error::{SessionError, SessionResult};
use crate::negotiation::{NegotiationOutput, NegotiationState, NegotiationStateMachine};
use crate::signaling::{codec, SignalingTransport, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
  Message(ChatMessage),
  /// The data channel is open and the negotiation is stable.
  Ready,
  Failed { reason: String },
  Closed,
}

enum SessionCommand {
  SendText {
    text: String,
    reply: oneshot::Sender<SessionResult<()>>,
  },
  Reconnect {
    reply: oneshot::Sender<SessionResult<()>>,
  },
  Messages {
    reply: oneshot::Sender<Vec<ChatMessage>>,
  },
  Close {
    reply: oneshot::Sender<()>,
  },
}

/// Cloneable front door for the UI layer.
#[derive(Clone)]
pub struct ChatSessionHandle {
  commands: mpsc::UnboundedSender<SessionCommand>,
  state: watch::Receiver<NegotiationState>,
}

impl ChatSessionHandle {
  /// Sends one chat message. Blank text is ignored; a closed session makes
  /// this a no-op.
  pub async fn send_text(&self, text: impl Into<String>) -> SessionResult<()> {
    let (reply, rx) = oneshot::channel();
    let command = SessionCommand::SendText {
      text: text.into(),
      reply,
    };
    if self.commands.send(command).is_err() {
      return Ok(());
    }
    rx.await.unwrap_or(Ok(()))
  }

  /// Reopens the relay link. Negotiation state is left as it is.
  pub async fn reconnect(&self) -> SessionResult<()> {
    let (reply, rx) = oneshot::channel();
    self
      .commands
      .send(SessionCommand::Reconnect { reply })
      .map_err(|_| SessionError::TransportUnavailable("session closed".to_string()))?;
    rx.await
      .unwrap_or_else(|_| Err(SessionError::TransportUnavailable("session closed".to_string())))
  }

  pub async fn messages(&self) -> Vec<ChatMessage> {
    let (reply, rx) = oneshot::channel();
    if self.commands.send(SessionCommand::Messages { reply }).is_err() {
      return Vec::new();
    }
    rx.await.unwrap_or_default()
  }

  pub async fn close(&self) {
    let (reply, rx) = oneshot::channel();
    if self.commands.send(SessionCommand::Close { reply }).is_ok() {
      let _ = rx.await;
    }
  }

  pub fn state(&self) -> NegotiationState {
    *self.state.borrow()
  }

  pub fn watch_state(&self) -> watch::Receiver<NegotiationState> {
    self.state.clone()
  }
}

pub struct ChatSession {
  config: SessionConfig,
  engine: Arc<dyn PeerEngine>,
  machine: NegotiationStateMachine,
  outputs: mpsc::UnboundedReceiver<NegotiationOutput>,
  channels: DataChannelManager,
  transport: SignalingTransport,
  transport_events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
  engine_events: mpsc::UnboundedReceiver<EngineEvent>,
  commands: mpsc::UnboundedReceiver<SessionCommand>,
  events: mpsc::UnboundedSender<SessionEvent>,
  state: watch::Sender<NegotiationState>,
  messages: Vec<ChatMessage>,
  ready: bool,
}

impl ChatSession {
  /// Spawns the session task over an already connected relay link.
  pub fn spawn(
    config: SessionConfig,
    engine: Arc<dyn PeerEngine>,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    transport: SignalingTransport,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
  ) -> (ChatSessionHandle, mpsc::UnboundedReceiver<SessionEvent>, JoinHandle<()>) {
    let (outputs_tx, outputs) = mpsc::unbounded_channel();
    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (events, events_rx) = mpsc::unbounded_channel();
    let (state, state_rx) = watch::channel(NegotiationState::Idle);

    let session = Self {
      machine: NegotiationStateMachine::new(engine.clone(), outputs_tx),
      config,
      engine,
      outputs,
      channels: DataChannelManager::new(),
      transport,
      transport_events: Some(transport_events),
      engine_events,
      commands,
      events,
      state,
      messages: Vec::new(),
      ready: false,
    };
    let task = tokio::spawn(session.run());
    let handle = ChatSessionHandle {
      commands: commands_tx,
      state: state_rx,
    };
    (handle, events_rx, task)
  }

  async fn run(mut self) {
    if self.config.role == Role::Initiator {
      self.initiate().await;
      self.flush_outputs();
    }
    let deadline = self.config.handshake_timeout.map(|timeout| Instant::now() + timeout);

    loop {
      let awaiting_handshake = deadline.is_some() && !self.handshake_settled();
      tokio::select! {
        command = self.commands.recv() => match command {
          Some(command) => self.handle_command(command).await,
          None => {
            debug!("all session handles dropped");
            self.shutdown().await;
          }
        },
        event = next_transport_event(&mut self.transport_events) => self.handle_transport_event(event).await,
        Some(event) = self.engine_events.recv() => self.handle_engine_event(event).await,
        _ = wait_until(deadline), if awaiting_handshake => self.machine.fail("handshake timed out"),
      }
      self.flush_outputs();
      if self.machine.state() == NegotiationState::Closed {
        break;
      }
    }
    debug!("session task finished");
  }

  async fn initiate(&mut self) {
    match self.engine.create_data_channel(&self.config.channel_label).await {
      Ok(channel) => self.channels.attach(channel),
      Err(err) => {
        self.machine.fail(&err.to_string());
        return;
      }
    }
    if let Err(err) = self.machine.start().await {
      warn!(error = %err, "could not start negotiation");
    }
  }

  async fn handle_command(&mut self, command: SessionCommand) {
    match command {
      SessionCommand::SendText { text, reply } => {
        let result = self.send_text(text).await;
        let _ = reply.send(result);
      }
      SessionCommand::Reconnect { reply } => {
        let result = self.reconnect().await;
        let _ = reply.send(result);
      }
      SessionCommand::Messages { reply } => {
        let _ = reply.send(self.messages.clone());
      }
      SessionCommand::Close { reply } => {
        self.shutdown().await;
        let _ = reply.send(());
      }
    }
  }

  async fn send_text(&mut self, text: String) -> SessionResult<()> {
    if !chat::is_sendable(&text) {
      return Ok(());
    }
    if self.machine.state() != NegotiationState::Stable || !self.channels.is_open() {
      return Err(SessionError::ChannelNotReady);
    }
    let payload = chat::encode_payload(&text)?;
    self.channels.send(payload).await?;
    self.record(ChatMessage::local(text));
    Ok(())
  }

  async fn reconnect(&mut self) -> SessionResult<()> {
    let url = self.config.signaling_url.clone();
    let events = self.transport.connect(&url).await?;
    self.transport_events = Some(events);
    info!(url = %url, "signaling link re-established");
    Ok(())
  }

  async fn handle_transport_event(&mut self, event: TransportEvent) {
    match event {
      TransportEvent::Frame(frame) => match codec::decode(&frame) {
        Ok(Some(envelope)) => {
          debug!(kind = envelope.kind(), "signaling envelope received");
          if let Err(err) = self.machine.handle_envelope(envelope).await {
            debug!(error = %err, "envelope not applied");
          }
        }
        Ok(None) => debug!("ignoring unknown signaling frame"),
        Err(err) => warn!(error = %err, "discarding signaling frame"),
      },
      TransportEvent::Closed => {
        warn!(state = %self.machine.state(), "signaling link lost");
        self.transport.close();
        self.transport_events = None;
      }
    }
  }

  async fn handle_engine_event(&mut self, event: EngineEvent) {
    match event {
      EngineEvent::LocalCandidate(candidate) => self.machine.handle_local_candidate(candidate),
      EngineEvent::RemoteChannel(channel) => self.channels.attach(channel),
      EngineEvent::ChannelOpen { label } => {
        if self.channels.on_open(&label) {
          self.machine.mark_connected();
        }
      }
      EngineEvent::ChannelMessage { label, payload } => {
        let Some(payload) = self.channels.on_message(&label, payload) else {
          return;
        };
        match chat::decode_payload(&payload) {
          Ok(text) => self.record(ChatMessage::remote(text)),
          Err(err) => warn!(error = %err, "discarding chat payload"),
        }
      }
      EngineEvent::ChannelClosed { label } => self.channels.on_closed(&label),
      EngineEvent::ConnectionState(state) => self.machine.handle_connection_state(state),
    }
  }

  fn check_ready(&mut self) {
    if !self.ready && self.machine.state() == NegotiationState::Stable && self.channels.is_open() {
      self.ready = true;
      self.publish(SessionEvent::Ready);
    }
  }

  fn record(&mut self, message: ChatMessage) {
    self.messages.push(message.clone());
    self.publish(SessionEvent::Message(message));
  }

  fn flush_outputs(&mut self) {
    while let Ok(output) = self.outputs.try_recv() {
      match output {
        NegotiationOutput::Signal(envelope) => match codec::encode(&envelope) {
          Ok(frame) => {
            if self.transport.send(frame).is_err() {
              debug!(kind = envelope.kind(), "envelope dropped");
            }
          }
          Err(err) => warn!(error = %err, "could not encode envelope"),
        },
        NegotiationOutput::Transition { to, .. } => {
          self.state.send_replace(to);
          match to {
            NegotiationState::Failed => {
              let reason = self.machine.failure_reason().unwrap_or("negotiation failed").to_string();
              self.publish(SessionEvent::Failed { reason });
            }
            NegotiationState::Closed => self.publish(SessionEvent::Closed),
            _ => {}
          }
        }
      }
    }
    self.check_ready();
  }

  async fn shutdown(&mut self) {
    self.channels.close().await;
    self.machine.close().await;
    self.transport.close();
    self.transport_events = None;
  }

  fn handshake_settled(&self) -> bool {
    let state = self.machine.state();
    state == NegotiationState::Stable || state.is_terminal()
  }

  fn publish(&self, event: SessionEvent) {
    let _ = self.events.send(event);
  }
}

async fn next_transport_event(events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>) -> TransportEvent {
  match events {
    Some(events) => events.recv().await.unwrap_or(TransportEvent::Closed),
    None => pending().await,
  }
}

async fn wait_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => sleep_until(deadline).await,
    None => pending().await,
  }
}
