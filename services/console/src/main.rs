//! Console harness for the session client.
//!
//! Connects to an agent endpoint, prints the event stream as it arrives, and
//! forwards stdin lines to the remote agent as control messages. All protocol
//! logic lives in `parley-client`; this binary is wiring only.

use anyhow::Context;
use clap::Parser;
use parley_client::{
    ConnectConfig, ControlMessage, DebugSink, EventCategory, SessionEvent, SessionManager,
    WebSocketTransportFactory,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "parley-console",
    about = "Drive a real-time agent session from the terminal"
)]
struct Args {
    /// Base URL of the discovery endpoint. Falls back to AGENT_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Label attached to outbound control messages.
    #[arg(long, default_value = "console")]
    label: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let args = Args::parse();
    let config = match &args.base_url {
        Some(base_url) => ConnectConfig::new(base_url.clone()),
        None => ConnectConfig::from_env().context("Failed to load configuration")?,
    };

    let manager = Arc::new(SessionManager::new(
        config,
        Arc::new(WebSocketTransportFactory),
    ));
    let router = manager.router();
    let debug_sink = DebugSink::attach(&router);

    let (_state_sub, mut state_rx) = router.subscribe_channel(EventCategory::StateChanged);
    let (_user_sub, mut user_rx) = router.subscribe_channel(EventCategory::UserTranscript);
    let (_bot_sub, mut bot_rx) = router.subscribe_channel(EventCategory::BotTranscript);
    let (_error_sub, mut error_rx) = router.subscribe_channel(EventCategory::Error);

    manager.connect().await.context("Failed to connect")?;
    info!("session connecting; type a line to send it to the agent, Ctrl+C to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = state_rx.recv() => {
                if let SessionEvent::StateChanged { previous, current } = event {
                    info!(%previous, %current, "session state changed");
                }
            }
            Some(event) = user_rx.recv() => {
                if let SessionEvent::UserTranscript(t) = event {
                    if t.is_final {
                        println!("you: {}", t.text);
                    }
                }
            }
            Some(event) = bot_rx.recv() => {
                if let SessionEvent::BotTranscript(t) = event {
                    println!("bot: {}", t.text);
                }
            }
            Some(event) = error_rx.recv() => {
                if let SessionEvent::Error(error) = event {
                    warn!(%error, "session error event");
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    let message = ControlMessage::new(
                        args.label.clone(),
                        serde_json::json!({ "text": line.trim() }),
                    );
                    match manager.control_channel().await {
                        Ok(channel) => {
                            if let Err(error) = channel.send(&message).await {
                                warn!(%error, "message not sent");
                            }
                        }
                        Err(error) => warn!(%error, "no active session"),
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "failed to read stdin");
                    break;
                }
            },
        }
    }

    manager.disconnect().await.context("Failed to disconnect")?;
    info!(entries = debug_sink.len(), "session closed");
    Ok(())
}
