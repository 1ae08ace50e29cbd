//! Signaling envelopes and the relay link that carries them.

pub mod codec;
pub mod transport;

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

pub use codec::{decode, encode};
#[cfg(test)]
pub use transport::RelayEnd;
pub use transport::{SignalingTransport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
  Offer,
  Answer,
}

/// Opaque session description blob, shaped like the browser's
/// `RTCSessionDescriptionInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
  #[serde(rename = "type")]
  pub kind: SdpKind,
  pub sdp: String,
}

impl SessionDescription {
  pub fn offer(sdp: impl Into<String>) -> Self {
    Self {
      kind: SdpKind::Offer,
      sdp: sdp.into(),
    }
  }

  pub fn answer(sdp: impl Into<String>) -> Self {
    Self {
      kind: SdpKind::Answer,
      sdp: sdp.into(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
  pub candidate: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sdp_mid: Option<String>,
  #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
  pub sdp_mline_index: Option<u16>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username_fragment: Option<String>,
}

impl From<RTCIceCandidateInit> for IceCandidate {
  fn from(init: RTCIceCandidateInit) -> Self {
    Self {
      candidate: init.candidate,
      sdp_mid: init.sdp_mid,
      sdp_mline_index: init.sdp_mline_index,
      username_fragment: init.username_fragment,
    }
  }
}

impl From<IceCandidate> for RTCIceCandidateInit {
  fn from(candidate: IceCandidate) -> Self {
    RTCIceCandidateInit {
      candidate: candidate.candidate,
      sdp_mid: candidate.sdp_mid,
      sdp_mline_index: candidate.sdp_mline_index,
      username_fragment: candidate.username_fragment,
    }
  }
}

/// One signaling message, one relay frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingEnvelope {
  #[serde(rename = "offer")]
  Offer { offer: SessionDescription },
  #[serde(rename = "answer")]
  Answer { answer: SessionDescription },
  #[serde(rename = "candidate")]
  Candidate { candidate: IceCandidate },
}

impl SignalingEnvelope {
  pub fn kind(&self) -> &'static str {
    match self {
      SignalingEnvelope::Offer { .. } => "offer",
      SignalingEnvelope::Answer { .. } => "answer",
      SignalingEnvelope::Candidate { .. } => "candidate",
    }
  }
}
