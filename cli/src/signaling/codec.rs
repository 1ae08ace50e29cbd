use serde_json::Value;

use super::{SdpKind, SignalingEnvelope};
use crate::error::{SessionError, SessionResult};

const KNOWN_TYPES: [&str; 3] = ["offer", "answer", "candidate"];

pub fn encode(envelope: &SignalingEnvelope) -> SessionResult<String> {
  serde_json::to_string(envelope).map_err(|err| SessionError::MalformedEnvelope(err.to_string()))
}

/// Decodes one relay frame. Frames whose `type` is not a signaling type are
/// ignored and yield `Ok(None)`.
pub fn decode(frame: &str) -> SessionResult<Option<SignalingEnvelope>> {
  let value: Value =
    serde_json::from_str(frame).map_err(|err| SessionError::MalformedEnvelope(err.to_string()))?;
  let kind = value
    .get("type")
    .and_then(Value::as_str)
    .ok_or_else(|| SessionError::MalformedEnvelope("missing type".to_string()))?;
  if !KNOWN_TYPES.contains(&kind) {
    return Ok(None);
  }
  let envelope: SignalingEnvelope =
    serde_json::from_value(value).map_err(|err| SessionError::MalformedEnvelope(err.to_string()))?;
  match &envelope {
    SignalingEnvelope::Offer { offer } if offer.kind != SdpKind::Offer => Err(mismatch("offer")),
    SignalingEnvelope::Answer { answer } if answer.kind != SdpKind::Answer => Err(mismatch("answer")),
    _ => Ok(Some(envelope)),
  }
}

fn mismatch(tag: &str) -> SessionError {
  SessionError::MalformedEnvelope(format!("{tag} envelope carries a different description type"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::signaling::{IceCandidate, SessionDescription};

  #[test]
  fn encodes_json_wire_shape() {
    let frame = encode(&SignalingEnvelope::Offer {
      offer: SessionDescription::offer("v=0\r\n"),
    })
    .expect("encode");
    let value: Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(value["type"], "offer");
    assert_eq!(value["offer"]["type"], "offer");
    assert_eq!(value["offer"]["sdp"], "v=0\r\n");
    assert!(value.get("answer").is_none());
  }

  #[test]
  fn decodes_browser_candidate() {
    let frame = r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
    let envelope = decode(frame).expect("decode").expect("known type");
    assert_eq!(
      envelope,
      SignalingEnvelope::Candidate {
        candidate: IceCandidate {
          candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".to_string(),
          sdp_mid: Some("0".to_string()),
          sdp_mline_index: Some(0),
          username_fragment: None,
        },
      }
    );
  }

  #[test]
  fn envelopes_survive_encode_decode() {
    let envelopes = vec![
      SignalingEnvelope::Offer {
        offer: SessionDescription::offer("offer-sdp"),
      },
      SignalingEnvelope::Answer {
        answer: SessionDescription::answer("answer-sdp"),
      },
      SignalingEnvelope::Candidate {
        candidate: IceCandidate {
          candidate: "candidate:2 1 tcp 1 10.0.0.3 9 typ host".to_string(),
          sdp_mid: Some("data".to_string()),
          sdp_mline_index: Some(1),
          username_fragment: Some("ufrag".to_string()),
        },
      },
    ];
    for envelope in envelopes {
      let frame = encode(&envelope).expect("encode");
      assert_eq!(decode(&frame).expect("decode"), Some(envelope));
    }
  }

  #[test]
  fn rejects_descriptions_that_contradict_the_tag() {
    let offer_as_answer = r#"{"type":"offer","offer":{"type":"answer","sdp":"v=0\r\n"}}"#;
    assert!(matches!(decode(offer_as_answer), Err(SessionError::MalformedEnvelope(_))));
    let answer_as_offer = r#"{"type":"answer","answer":{"type":"offer","sdp":"v=0\r\n"}}"#;
    assert!(matches!(decode(answer_as_offer), Err(SessionError::MalformedEnvelope(_))));
  }

  #[test]
  fn unknown_types_are_ignored() {
    assert_eq!(decode(r#"{"type":"hello","from":"x"}"#).expect("decode"), None);
  }

  #[test]
  fn rejects_unparseable_frames() {
    assert!(matches!(decode("not json"), Err(SessionError::MalformedEnvelope(_))));
    assert!(matches!(
      decode(r#"{"type":"candidate","candidate":42}"#),
      Err(SessionError::MalformedEnvelope(_))
    ));
    assert!(matches!(
      decode(r#"{"type":"offer"}"#),
      Err(SessionError::MalformedEnvelope(_))
    ));
    assert!(matches!(decode(r#"{"offer":{}}"#), Err(SessionError::MalformedEnvelope(_))));
  }
}
