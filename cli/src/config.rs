use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{SessionError, SessionResult};

pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8080/";
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_CHANNEL_LABEL: &str = "chat";

const SIGNALING_URL_ENV: &str = "PAIRCHAT_SIGNALING_URL";
const ICE_SERVERS_ENV: &str = "PAIRCHAT_ICE_SERVERS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  /// Creates the data channel and sends the Offer.
  Initiator,
  /// Waits for the Offer.
  Responder,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
  pub signaling_url: Url,
  pub role: Role,
  pub ice_servers: Vec<String>,
  pub channel_label: String,
  pub handshake_timeout: Option<Duration>,
}

impl SessionConfig {
  pub fn new(signaling_url: Url, role: Role) -> Self {
    Self {
      signaling_url,
      role,
      ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
      channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
      handshake_timeout: None,
    }
  }

  /// Builds a config from explicit values, falling back to the environment
  /// and then to defaults.
  pub fn resolve(endpoint: Option<&str>, role: Role, ice_servers: &[String]) -> SessionResult<Self> {
    Self::resolve_with(endpoint, role, ice_servers, |key| env::var(key).ok())
  }

  /// Same as [`SessionConfig::resolve`] with an explicit variable lookup.
  pub fn resolve_with(
    endpoint: Option<&str>,
    role: Role,
    ice_servers: &[String],
    lookup: impl Fn(&str) -> Option<String>,
  ) -> SessionResult<Self> {
    let signaling_url = signaling_url_with(endpoint, &lookup)?;
    let mut config = Self::new(signaling_url, role);
    if !ice_servers.is_empty() {
      config.ice_servers = ice_servers.to_vec();
    } else if let Some(servers) = lookup(ICE_SERVERS_ENV).and_then(|value| parse_ice_servers(&value)) {
      config.ice_servers = servers;
    }
    Ok(config)
  }
}

fn signaling_url_with(endpoint: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> SessionResult<Url> {
  let endpoint = endpoint
    .map(|value| value.to_string())
    .or_else(|| lookup(SIGNALING_URL_ENV).filter(|value| !value.trim().is_empty()))
    .unwrap_or_else(|| DEFAULT_SIGNALING_URL.to_string());
  normalize_ws_url(&endpoint)
}

/// Maps http(s) relay addresses onto their WebSocket scheme.
pub fn normalize_ws_url(endpoint: &str) -> SessionResult<Url> {
  let mut url = Url::parse(endpoint.trim())
    .map_err(|err| SessionError::Config(format!("invalid signaling url {endpoint}: {err}")))?;
  let scheme = match url.scheme() {
    "https" | "wss" => "wss",
    "http" | "ws" => "ws",
    other => return Err(SessionError::Config(format!("unsupported signaling scheme: {other}"))),
  };
  url
    .set_scheme(scheme)
    .map_err(|_| SessionError::Config("invalid signaling scheme".to_string()))?;
  url.set_fragment(None);
  Ok(url)
}

fn parse_ice_servers(value: &str) -> Option<Vec<String>> {
  let servers: Vec<String> = value
    .split(',')
    .map(str::trim)
    .filter(|server| !server.is_empty())
    .map(str::to_string)
    .collect();
  if servers.is_empty() {
    None
  } else {
    Some(servers)
  }
}
