//! Relay link: one WebSocket, text frames in and out, no protocol knowledge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
  Frame(String),
  Closed,
}

/// The relay side of an in-process link created by [`SignalingTransport::pipe`].
#[cfg(test)]
pub struct RelayEnd {
  pub outbound: mpsc::UnboundedReceiver<String>,
  pub inbound: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Default)]
pub struct SignalingTransport {
  outbound: Option<mpsc::UnboundedSender<String>>,
  open: Arc<AtomicBool>,
  tasks: Vec<JoinHandle<()>>,
}

impl SignalingTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Opens the relay link. The previous link, if any, is replaced only once
  /// the new handshake succeeds; events for the new link arrive on the
  /// returned receiver and end with `Closed`.
  pub async fn connect(&mut self, url: &Url) -> SessionResult<mpsc::UnboundedReceiver<TransportEvent>> {
    info!(url = %url, "connecting signaling link");
    let (ws_stream, _) = connect_async(url.as_str())
      .await
      .map_err(|err| SessionError::TransportUnavailable(err.to_string()))?;
    self.close();
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));

    let writer_open = open.clone();
    let writer = tokio::spawn(async move {
      while let Some(text) = out_rx.recv().await {
        if let Err(err) = ws_write.send(Message::Text(text)).await {
          warn!(error = %err, "signaling write failed");
          break;
        }
      }
      writer_open.store(false, Ordering::SeqCst);
      let _ = ws_write.close().await;
    });

    let reader_open = open.clone();
    let reader = tokio::spawn(async move {
      while let Some(msg) = ws_read.next().await {
        let frame = match msg {
          Ok(Message::Text(text)) => text,
          Ok(Message::Binary(data)) => match String::from_utf8(data) {
            Ok(text) => text,
            Err(_) => {
              debug!("dropping non-utf8 binary frame");
              continue;
            }
          },
          Ok(Message::Close(_)) => break,
          Ok(_) => continue,
          Err(err) => {
            warn!(error = %err, "signaling read failed");
            break;
          }
        };
        if event_tx.send(TransportEvent::Frame(frame)).is_err() {
          break;
        }
      }
      reader_open.store(false, Ordering::SeqCst);
      info!("signaling link closed");
      let _ = event_tx.send(TransportEvent::Closed);
    });

    self.outbound = Some(out_tx);
    self.open = open;
    self.tasks = vec![writer, reader];
    Ok(event_rx)
  }

  /// In-process link with no socket behind it. The relay end sees every frame
  /// sent and injects inbound events.
  #[cfg(test)]
  pub fn pipe() -> (Self, mpsc::UnboundedReceiver<TransportEvent>, RelayEnd) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let transport = Self {
      outbound: Some(out_tx),
      open: Arc::new(AtomicBool::new(true)),
      tasks: Vec::new(),
    };
    let relay = RelayEnd {
      outbound: out_rx,
      inbound: event_tx,
    };
    (transport, event_rx, relay)
  }

  pub fn is_open(&self) -> bool {
    self.outbound.is_some() && self.open.load(Ordering::SeqCst)
  }

  /// Queues one frame for the relay. When the link is down the frame is
  /// dropped and logged; the error is informational for callers that retry.
  pub fn send(&self, frame: String) -> SessionResult<()> {
    let outbound = match self.outbound.as_ref() {
      Some(outbound) if self.open.load(Ordering::SeqCst) => outbound,
      _ => {
        warn!("signaling link not open, dropping frame");
        return Err(SessionError::TransportUnavailable("link not open".to_string()));
      }
    };
    outbound.send(frame).map_err(|_| {
      warn!("signaling writer gone, dropping frame");
      SessionError::TransportUnavailable("writer stopped".to_string())
    })
  }

  pub fn close(&mut self) {
    self.open.store(false, Ordering::SeqCst);
    self.outbound = None;
    for task in self.tasks.drain(..) {
      task.abort();
    }
  }
}

impl Drop for SignalingTransport {
  fn drop(&mut self) {
    self.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::net::TcpListener;
  use tokio_tungstenite::accept_async;

  async fn relay_listener() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let url = Url::parse(&format!("ws://{addr}/")).expect("url");
    (listener, url)
  }

  #[tokio::test]
  async fn pipe_delivers_frames_and_stops_after_close() {
    let (mut transport, _events, mut relay) = SignalingTransport::pipe();
    transport.send("one".to_string()).expect("open link");
    assert_eq!(relay.outbound.recv().await.as_deref(), Some("one"));

    transport.close();
    assert!(!transport.is_open());
    assert!(matches!(
      transport.send("two".to_string()),
      Err(SessionError::TransportUnavailable(_))
    ));
  }

  #[tokio::test]
  async fn websocket_round_trip_and_reconnect() {
    let (listener, url) = relay_listener().await;
    let server = tokio::spawn(async move {
      // first connection: echo one frame, then hang up
      let (stream, _) = listener.accept().await.expect("accept");
      let mut ws = accept_async(stream).await.expect("handshake");
      let frame = ws.next().await.expect("frame").expect("ok");
      ws.send(frame).await.expect("echo");
      ws.close(None).await.expect("close");

      // second connection: push one frame
      let (stream, _) = listener.accept().await.expect("accept");
      let mut ws = accept_async(stream).await.expect("handshake");
      ws.send(Message::Text("again".to_string())).await.expect("send");
      while let Some(Ok(_)) = ws.next().await {}
    });

    let mut transport = SignalingTransport::new();
    assert!(!transport.is_open());
    let mut events = transport.connect(&url).await.expect("connect");
    transport.send("hello".to_string()).expect("send");
    assert_eq!(events.recv().await, Some(TransportEvent::Frame("hello".to_string())));
    assert_eq!(events.recv().await, Some(TransportEvent::Closed));
    assert!(!transport.is_open());
    assert!(transport.send("lost".to_string()).is_err());

    let mut events = transport.connect(&url).await.expect("reconnect");
    assert_eq!(events.recv().await, Some(TransportEvent::Frame("again".to_string())));
    transport.close();
    server.abort();
  }

  #[tokio::test]
  async fn failed_reconnect_keeps_the_current_link() {
    let (listener, url) = relay_listener().await;
    let server = tokio::spawn(async move {
      let (stream, _) = listener.accept().await.expect("accept");
      let mut ws = accept_async(stream).await.expect("handshake");
      let frame = ws.next().await.expect("frame").expect("ok");
      ws.send(frame).await.expect("echo");
      while let Some(Ok(_)) = ws.next().await {}
    });

    let mut transport = SignalingTransport::new();
    let mut events = transport.connect(&url).await.expect("connect");
    let (dead, dead_url) = relay_listener().await;
    drop(dead);
    assert!(matches!(
      transport.connect(&dead_url).await,
      Err(SessionError::TransportUnavailable(_))
    ));

    assert!(transport.is_open());
    transport.send("still here".to_string()).expect("send on old link");
    assert_eq!(events.recv().await, Some(TransportEvent::Frame("still here".to_string())));
    transport.close();
    server.abort();
  }

  #[tokio::test]
  async fn binary_frames_are_read_as_text_when_utf8() {
    let (listener, url) = relay_listener().await;
    let server = tokio::spawn(async move {
      let (stream, _) = listener.accept().await.expect("accept");
      let mut ws = accept_async(stream).await.expect("handshake");
      ws.send(Message::Binary(vec![0xff, 0xfe, 0x00])).await.expect("send");
      ws.send(Message::Binary(br#"{"type":"offer"}"#.to_vec())).await.expect("send");
      ws.close(None).await.expect("close");
    });

    let mut transport = SignalingTransport::new();
    let mut events = transport.connect(&url).await.expect("connect");
    assert_eq!(
      events.recv().await,
      Some(TransportEvent::Frame(r#"{"type":"offer"}"#.to_string()))
    );
    assert_eq!(events.recv().await, Some(TransportEvent::Closed));
    server.await.expect("server");
  }

  #[tokio::test]
  async fn connect_failure_is_transport_unavailable() {
    let (listener, url) = relay_listener().await;
    drop(listener);
    let mut transport = SignalingTransport::new();
    assert!(matches!(
      transport.connect(&url).await,
      Err(SessionError::TransportUnavailable(_))
    ));
  }
}
