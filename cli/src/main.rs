use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use pairchat::chat::{ChatMessage, Direction};
use pairchat::config::DEFAULT_CHANNEL_LABEL;
use pairchat::engine::RtcEngine;
use pairchat::signaling::SignalingTransport;
use pairchat::{logging, ChatSession, Role, SessionConfig, SessionEvent};

const TIME_FORMAT: &str = "%H:%M:%S%.3f";

#[derive(Parser, Debug)]
#[command(name = "pairchat")]
#[command(about = "Peer-to-peer text chat over a WebRTC data channel")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create the data channel and send the offer
  Start(ChatArgs),
  /// Wait for the peer's offer and answer it
  Join(ChatArgs),
}

#[derive(Args, Debug)]
struct ChatArgs {
  #[arg(value_name = "ENDPOINT", help = "Signaling relay URL (ws, wss, http or https)")]
  endpoint: Option<String>,
  #[arg(long = "ice-server", value_name = "URL", help = "STUN/TURN server, repeatable")]
  ice_servers: Vec<String>,
  #[arg(long, value_name = "SECS", help = "Fail when the handshake has not completed in time")]
  handshake_timeout: Option<u64>,
  #[arg(long, default_value = DEFAULT_CHANNEL_LABEL, value_name = "NAME", help = "Data channel label")]
  label: String,
  #[arg(short, long, help = "Debug logging")]
  verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let (role, args) = match cli.command {
    Command::Start(args) => (Role::Initiator, args),
    Command::Join(args) => (Role::Responder, args),
  };
  logging::init(args.verbose);
  run_chat(role, args).await
}

async fn run_chat(role: Role, args: ChatArgs) -> Result<()> {
  let mut config = SessionConfig::resolve(args.endpoint.as_deref(), role, &args.ice_servers)?;
  config.channel_label = args.label;
  config.handshake_timeout = args.handshake_timeout.map(Duration::from_secs);

  info!(role = ?config.role, url = %config.signaling_url, "starting chat session");
  let mut transport = SignalingTransport::new();
  let transport_events = transport
    .connect(&config.signaling_url)
    .await
    .context("connect signaling websocket")?;
  let (engine, engine_events) = RtcEngine::new(&config).await.context("create peer connection")?;
  let (handle, mut events, task) =
    ChatSession::spawn(config, Arc::new(engine), engine_events, transport, transport_events);

  print_notice("type a message and press enter; /reconnect re-opens signaling, /quit exits");
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut failure = None;
  loop {
    tokio::select! {
      line = lines.next_line() => match line.context("read stdin")? {
        Some(line) if line.trim() == "/quit" => break,
        Some(line) if line.trim() == "/reconnect" => {
          if let Err(err) = handle.reconnect().await {
            print_notice(&format!("reconnect failed: {err}"));
          }
        }
        Some(line) => {
          if let Err(err) = handle.send_text(line).await {
            print_notice(&format!("not sent: {err}"));
          }
        }
        None => break,
      },
      event = events.recv() => match event {
        Some(SessionEvent::Message(message)) => print_message(&message),
        Some(SessionEvent::Ready) => print_notice("connected"),
        Some(SessionEvent::Failed { reason }) => {
          failure = Some(reason);
          break;
        }
        Some(SessionEvent::Closed) | None => break,
      },
    }
  }

  handle.close().await;
  let _ = task.await;
  match failure {
    Some(reason) => Err(anyhow!("session failed: {reason}")),
    None => Ok(()),
  }
}

fn print_message(message: &ChatMessage) {
  let who = match message.direction {
    Direction::Local => "you",
    Direction::Remote => "peer",
  };
  let at = message.at.format(TIME_FORMAT);
  println!("[{at}] {who}: {}", message.text);
}

fn print_notice(text: &str) {
  let now = chrono::Utc::now().format(TIME_FORMAT);
  println!("[{now}] * {text}");
}
