use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use relay_session::{
    ConfigOverrides, SessionController, SessionEvent, SessionSettings, WebSocketConnector,
    load_config,
};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Keep a WebSocket session alive and relay stdin/stdout over it")]
struct Cli {
    /// WebSocket endpoint (overrides the config file)
    address: Option<String>,

    /// Config file (defaults to ./relay.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Delay before reconnecting after the connection is lost
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relay_session=info,relay=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let overrides = ConfigOverrides {
        address: cli.address.clone(),
        reconnect_backoff_ms: cli.backoff_ms,
    };
    let settings = SessionSettings::extract(&load_config(cli.config.as_deref(), &overrides))
        .context("failed to load configuration")?;
    info!(
        address = %settings.address,
        backoff_ms = settings.reconnect_backoff.as_millis() as u64,
        "starting relay"
    );

    let controller = SessionController::new(WebSocketConnector, settings);
    let mut events = controller.bus().subscribe();
    let session = controller.start();

    let json = cli.json;
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = print_event(&event, json) {
                        warn!(error = %e, "failed to print event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "output lagged, events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) => session.bus().request_send(line),
                None => {
                    info!("stdin closed");
                    break;
                }
            },
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                info!("interrupted");
                break;
            }
        }
    }

    session.stop().await;
    printer.abort();
    Ok(())
}

fn print_event(event: &SessionEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        SessionEvent::Connected => println!("* connected"),
        SessionEvent::ConnectionLost => println!("* connection lost"),
        SessionEvent::MessageReceived(payload) => println!("< {payload}"),
        SessionEvent::MessageSent(payload) => println!("> {payload}"),
        // Echo of our own request; the matching `MessageSent` follows.
        SessionEvent::SendRequested(_) => {}
    }
    Ok(())
}
