use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use super::{ChannelHandle, ConnectionState, EngineEvent, PeerEngine};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};

/// webrtc-rs peer connection behind the [`PeerEngine`] seam.
pub struct RtcEngine {
  pc: Arc<RTCPeerConnection>,
  events: mpsc::UnboundedSender<EngineEvent>,
}

impl RtcEngine {
  pub async fn new(config: &SessionConfig) -> SessionResult<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
    Self::with_setting_engine(config, SettingEngine::default()).await
  }

  pub async fn with_setting_engine(
    config: &SessionConfig,
    settings: SettingEngine,
  ) -> SessionResult<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
    let pc = create_peer_connection(&config.ice_servers, settings).await?;
    let (events, events_rx) = mpsc::unbounded_channel();

    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
      let tx = tx.clone();
      Box::pin(async move {
        let Some(candidate) = candidate else {
          debug!("local candidate gathering complete");
          return;
        };
        match candidate.to_json() {
          Ok(init) => {
            let _ = tx.send(EngineEvent::LocalCandidate(init.into()));
          }
          Err(err) => warn!(error = %err, "failed to serialize local candidate"),
        }
      })
    }));

    let tx = events.clone();
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
      let tx = tx.clone();
      Box::pin(async move {
        debug!(label = dc.label(), "remote data channel announced");
        let _ = tx.send(EngineEvent::RemoteChannel(dc.clone()));
        wire_channel(&dc, tx);
      })
    }));

    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
      let tx = tx.clone();
      Box::pin(async move {
        debug!(state = %state, "peer connection state changed");
        if let Some(state) = map_connection_state(state) {
          let _ = tx.send(EngineEvent::ConnectionState(state));
        }
      })
    }));

    Ok((Self { pc, events }, events_rx))
  }
}

#[async_trait]
impl PeerEngine for RtcEngine {
  async fn create_offer(&self) -> SessionResult<SessionDescription> {
    from_rtc(self.pc.create_offer(None).await?)
  }

  async fn create_answer(&self) -> SessionResult<SessionDescription> {
    from_rtc(self.pc.create_answer(None).await?)
  }

  async fn set_local_description(&self, desc: SessionDescription) -> SessionResult<()> {
    self.pc.set_local_description(to_rtc(desc)?).await?;
    Ok(())
  }

  async fn set_remote_description(&self, desc: SessionDescription) -> SessionResult<()> {
    self.pc.set_remote_description(to_rtc(desc)?).await?;
    Ok(())
  }

  async fn add_ice_candidate(&self, candidate: IceCandidate) -> SessionResult<()> {
    self.pc.add_ice_candidate(candidate.into()).await?;
    Ok(())
  }

  async fn create_data_channel(&self, label: &str) -> SessionResult<Arc<dyn ChannelHandle>> {
    let dc = self
      .pc
      .create_data_channel(
        label,
        Some(RTCDataChannelInit {
          ordered: Some(true),
          ..Default::default()
        }),
      )
      .await?;
    wire_channel(&dc, self.events.clone());
    Ok(dc as Arc<dyn ChannelHandle>)
  }

  async fn close(&self) -> SessionResult<()> {
    self.pc.close().await?;
    Ok(())
  }
}

#[async_trait]
impl ChannelHandle for RTCDataChannel {
  fn label(&self) -> String {
    RTCDataChannel::label(self).to_string()
  }

  async fn send_text(&self, text: String) -> SessionResult<()> {
    RTCDataChannel::send_text(self, text).await?;
    Ok(())
  }

  async fn close(&self) -> SessionResult<()> {
    RTCDataChannel::close(self).await?;
    Ok(())
  }
}

fn wire_channel(dc: &Arc<RTCDataChannel>, events: mpsc::UnboundedSender<EngineEvent>) {
  let label = dc.label().to_string();

  let tx = events.clone();
  let open_label = label.clone();
  dc.on_open(Box::new(move || {
    let tx = tx.clone();
    let label = open_label.clone();
    Box::pin(async move {
      let _ = tx.send(EngineEvent::ChannelOpen { label });
    })
  }));

  let tx = events.clone();
  let message_label = label.clone();
  dc.on_message(Box::new(move |msg: DataChannelMessage| {
    let tx = tx.clone();
    let label = message_label.clone();
    Box::pin(async move {
      let _ = tx.send(EngineEvent::ChannelMessage {
        label,
        payload: msg.data,
      });
    })
  }));

  let tx = events.clone();
  let close_label = label.clone();
  dc.on_close(Box::new(move || {
    let tx = tx.clone();
    let label = close_label.clone();
    Box::pin(async move {
      let _ = tx.send(EngineEvent::ChannelClosed { label });
    })
  }));

  // open may already have fired before the handlers were attached
  if dc.ready_state() == RTCDataChannelState::Open {
    let _ = events.send(EngineEvent::ChannelOpen { label });
  }
}

async fn create_peer_connection(
  ice_servers: &[String],
  settings: SettingEngine,
) -> SessionResult<Arc<RTCPeerConnection>> {
  let mut media_engine = MediaEngine::default();
  media_engine.register_default_codecs()?;

  let mut registry = Registry::new();
  registry = register_default_interceptors(registry, &mut media_engine)?;

  let api = APIBuilder::new()
    .with_media_engine(media_engine)
    .with_interceptor_registry(registry)
    .with_setting_engine(settings)
    .build();

  // host candidates only when no servers are configured
  let ice_servers = if ice_servers.is_empty() {
    Vec::new()
  } else {
    vec![RTCIceServer {
      urls: ice_servers.to_vec(),
      ..Default::default()
    }]
  };
  let config = RTCConfiguration {
    ice_servers,
    ..Default::default()
  };

  let pc = api.new_peer_connection(config).await?;
  Ok(Arc::new(pc))
}

fn to_rtc(desc: SessionDescription) -> SessionResult<RTCSessionDescription> {
  let rtc = match desc.kind {
    SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
    SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
  };
  Ok(rtc)
}

fn from_rtc(desc: RTCSessionDescription) -> SessionResult<SessionDescription> {
  let kind = match desc.sdp_type {
    RTCSdpType::Offer => SdpKind::Offer,
    RTCSdpType::Answer => SdpKind::Answer,
    other => return Err(SessionError::EngineFailure(format!("unsupported sdp type {other}"))),
  };
  Ok(SessionDescription { kind, sdp: desc.sdp })
}

fn map_connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
  match state {
    RTCPeerConnectionState::New => Some(ConnectionState::New),
    RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
    RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
    RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
    RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
    RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
    RTCPeerConnectionState::Unspecified => None,
  }
}
