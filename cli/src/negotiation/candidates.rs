use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::engine::PeerEngine;
use crate::signaling::IceCandidate;

/// Remote candidates that arrived before a remote description was set.
#[derive(Debug, Default)]
pub struct IceCandidateBuffer {
  queue: VecDeque<IceCandidate>,
  closed: bool,
}

impl IceCandidateBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn enqueue(&mut self, candidate: IceCandidate) {
    if self.closed {
      debug!("candidate buffer closed, ignoring candidate");
      return;
    }
    self.queue.push_back(candidate);
  }

  pub fn len(&self) -> usize {
    self.queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }

  /// Applies every buffered candidate in arrival order and empties the queue.
  /// A candidate the engine rejects is logged and skipped. Returns how many
  /// were accepted.
  pub async fn drain_into(&mut self, engine: &dyn PeerEngine) -> usize {
    let mut applied = 0;
    while let Some(candidate) = self.queue.pop_front() {
      match engine.add_ice_candidate(candidate).await {
        Ok(()) => applied += 1,
        Err(err) => warn!(error = %err, "buffered candidate rejected"),
      }
    }
    if applied > 0 {
      debug!(applied, "drained buffered candidates");
    }
    applied
  }

  pub fn close(&mut self) {
    self.closed = true;
    self.queue.clear();
  }
}
