//! Offer/answer negotiation driven as an explicit state machine.
//!
//! The offering side keeps remote candidates in an [`IceCandidateBuffer`]
//! until the Answer sets its remote description; the answering side sets the
//! remote description while handling the Offer and applies candidates as they
//! come. Callers must serialize every method call: transitions read and write
//! the state and the buffer as one unit.

pub mod candidates;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{ConnectionState, PeerEngine};
use crate::error::{SessionError, SessionResult};
use crate::signaling::{IceCandidate, SessionDescription, SignalingEnvelope};

pub use candidates::IceCandidateBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
  Idle,
  OfferCreated,
  OfferReceived,
  AnswerCreated,
  Stable,
  Closed,
  Failed,
}

impl NegotiationState {
  pub fn is_terminal(self) -> bool {
    matches!(self, NegotiationState::Closed | NegotiationState::Failed)
  }
}

impl fmt::Display for NegotiationState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NegotiationState::Idle => write!(f, "idle"),
      NegotiationState::OfferCreated => write!(f, "offer-created"),
      NegotiationState::OfferReceived => write!(f, "offer-received"),
      NegotiationState::AnswerCreated => write!(f, "answer-created"),
      NegotiationState::Stable => write!(f, "stable"),
      NegotiationState::Closed => write!(f, "closed"),
      NegotiationState::Failed => write!(f, "failed"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutput {
  Signal(SignalingEnvelope),
  Transition {
    from: NegotiationState,
    to: NegotiationState,
  },
}

pub struct NegotiationStateMachine {
  engine: Arc<dyn PeerEngine>,
  state: NegotiationState,
  candidates: IceCandidateBuffer,
  remote_description_set: bool,
  failure: Option<String>,
  outputs: mpsc::UnboundedSender<NegotiationOutput>,
}

impl NegotiationStateMachine {
  pub fn new(engine: Arc<dyn PeerEngine>, outputs: mpsc::UnboundedSender<NegotiationOutput>) -> Self {
    Self {
      engine,
      state: NegotiationState::Idle,
      candidates: IceCandidateBuffer::new(),
      remote_description_set: false,
      failure: None,
      outputs,
    }
  }

  pub fn state(&self) -> NegotiationState {
    self.state
  }

  pub fn failure_reason(&self) -> Option<&str> {
    self.failure.as_deref()
  }

  pub fn pending_candidates(&self) -> usize {
    self.candidates.len()
  }

  /// Opens a negotiation round as the offering side.
  pub async fn start(&mut self) -> SessionResult<()> {
    if self.state != NegotiationState::Idle {
      return Err(self.reject("start"));
    }
    if let Err(err) = self.send_offer().await {
      return Err(self.engine_failed(err));
    }
    self.transition(NegotiationState::OfferCreated);
    Ok(())
  }

  pub async fn handle_envelope(&mut self, envelope: SignalingEnvelope) -> SessionResult<()> {
    if self.state.is_terminal() {
      debug!(kind = envelope.kind(), state = %self.state, "ignoring envelope after negotiation ended");
      return Ok(());
    }
    match envelope {
      SignalingEnvelope::Offer { offer } => self.handle_offer(offer).await,
      SignalingEnvelope::Answer { answer } => self.handle_answer(answer).await,
      SignalingEnvelope::Candidate { candidate } => {
        self.handle_remote_candidate(candidate).await;
        Ok(())
      }
    }
  }

  /// Forwards a locally discovered candidate to the peer, whatever the state.
  pub fn handle_local_candidate(&mut self, candidate: IceCandidate) {
    if self.state.is_terminal() {
      return;
    }
    self.emit(NegotiationOutput::Signal(SignalingEnvelope::Candidate { candidate }));
  }

  pub fn handle_connection_state(&mut self, state: ConnectionState) {
    match state {
      ConnectionState::Connected => self.mark_connected(),
      ConnectionState::Failed => self.fail("peer connection failed"),
      ConnectionState::Disconnected => warn!("peer connection disconnected"),
      other => debug!(state = ?other, "peer connection state"),
    }
  }

  /// The answering side has no Answer to wait for; it becomes stable once the
  /// engine reports a usable connection.
  pub fn mark_connected(&mut self) {
    if self.state == NegotiationState::AnswerCreated {
      self.transition(NegotiationState::Stable);
    }
  }

  pub fn fail(&mut self, reason: &str) {
    if self.state.is_terminal() {
      return;
    }
    warn!(reason, state = %self.state, "negotiation failed");
    self.failure = Some(reason.to_string());
    self.transition(NegotiationState::Failed);
  }

  /// Releases the engine. Safe from any state; later calls are no-ops.
  pub async fn close(&mut self) {
    if self.state == NegotiationState::Closed {
      return;
    }
    self.candidates.close();
    if let Err(err) = self.engine.close().await {
      warn!(error = %err, "engine close failed");
    }
    self.transition(NegotiationState::Closed);
  }

  async fn send_offer(&mut self) -> SessionResult<()> {
    let offer = self.engine.create_offer().await?;
    self.engine.set_local_description(offer.clone()).await?;
    self.emit(NegotiationOutput::Signal(SignalingEnvelope::Offer { offer }));
    Ok(())
  }

  async fn handle_offer(&mut self, offer: SessionDescription) -> SessionResult<()> {
    if self.state != NegotiationState::Idle {
      return Err(self.reject("offer"));
    }
    self.transition(NegotiationState::OfferReceived);
    if let Err(err) = self.answer_offer(offer).await {
      return Err(self.engine_failed(err));
    }
    self.transition(NegotiationState::AnswerCreated);
    Ok(())
  }

  async fn answer_offer(&mut self, offer: SessionDescription) -> SessionResult<()> {
    self.engine.set_remote_description(offer).await?;
    self.remote_description_set = true;
    let answer = self.engine.create_answer().await?;
    self.engine.set_local_description(answer.clone()).await?;
    self.emit(NegotiationOutput::Signal(SignalingEnvelope::Answer { answer }));
    self.candidates.drain_into(&*self.engine).await;
    Ok(())
  }

  async fn handle_answer(&mut self, answer: SessionDescription) -> SessionResult<()> {
    if self.state != NegotiationState::OfferCreated {
      return Err(self.reject("answer"));
    }
    if let Err(err) = self.engine.set_remote_description(answer).await {
      return Err(self.engine_failed(err));
    }
    self.remote_description_set = true;
    self.candidates.drain_into(&*self.engine).await;
    self.transition(NegotiationState::Stable);
    Ok(())
  }

  async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
    if !self.remote_description_set {
      debug!(state = %self.state, "remote description not set, buffering candidate");
      self.candidates.enqueue(candidate);
      return;
    }
    if let Err(err) = self.engine.add_ice_candidate(candidate).await {
      warn!(error = %err, "remote candidate rejected");
    }
  }

  fn reject(&self, event: &'static str) -> SessionError {
    warn!(event, state = %self.state, "invalid negotiation event");
    SessionError::InvalidStateTransition {
      state: self.state,
      event,
    }
  }

  fn engine_failed(&mut self, err: SessionError) -> SessionError {
    let reason = err.to_string();
    self.fail(&reason);
    match err {
      SessionError::EngineFailure(_) => err,
      other => SessionError::EngineFailure(other.to_string()),
    }
  }

  fn transition(&mut self, to: NegotiationState) {
    let from = self.state;
    if from == to {
      return;
    }
    info!(%from, %to, "negotiation state changed");
    self.state = to;
    self.emit(NegotiationOutput::Transition { from, to });
  }

  fn emit(&self, output: NegotiationOutput) {
    if self.outputs.send(output).is_err() {
      debug!("negotiation output receiver dropped");
    }
  }
}
