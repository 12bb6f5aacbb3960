//! Ferry CLI
//!
//! Send and receive single files peer to peer using tickets.

mod config;
mod progress;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ferry_core::{Controller, ControllerConfig, Event, EventPayload};
use ferry_discovery::RelayServer;
use ferry_files::human_bytes;
use tokio::time;
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::{TransferProgress, format_duration, format_rate};

/// Ferry - encrypted peer-to-peer file transfer
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print events as JSON lines on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file path (default: <config dir>/ferry/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Rendezvous relay to register with or dial through (host:port)
    #[arg(long, global = true)]
    relay: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file
    ///
    /// Without --to, prints a ticket and waits for the receiver to redeem it.
    Send {
        /// File to send
        file: PathBuf,

        /// Ticket published by a listening receiver
        #[arg(long)]
        to: Option<String>,
    },

    /// Receive a file
    Receive {
        /// Sender's ticket or host:port
        #[arg(required_unless_present = "listen")]
        target: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print a ticket and wait for a sender instead of dialing one
        #[arg(long, conflicts_with = "target")]
        listen: bool,
    },

    /// Run a rendezvous relay
    Relay {
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0:7878")]
        bind: SocketAddr,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    let mut controller_config = config.controller_config()?;
    if let Some(relay) = &cli.relay {
        controller_config.transport.relay = Some(relay.clone());
    }

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let output = if cli.json { Output::Json } else { Output::human() };

    match cli.command {
        Commands::Send { file, to } => send(file, to, controller_config, output).await,
        Commands::Receive {
            target,
            output: dir,
            listen,
        } => {
            let dir = dir.unwrap_or_else(|| config.receive.output_dir.clone());
            receive(target.filter(|_| !listen), dir, controller_config, output).await
        }
        Commands::Relay { bind } => run_relay(bind, cli.json).await,
        Commands::Version => {
            if cli.json {
                println!("{}", serde_json::json!({ "version": ferry_core::VERSION }));
            } else {
                println!("ferry {}", ferry_core::VERSION);
            }
            Ok(())
        }
    }
}

/// Send a file, either to a ticket or by publishing one
async fn send(
    file: PathBuf,
    to: Option<String>,
    config: ControllerConfig,
    mut output: Output,
) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    tracing::info!("Sending {}", file.display());

    let controller = Controller::new(config)?;
    match to {
        Some(ticket) => controller
            .start_send_to_ticket(&file, &ticket)
            .context("Cannot send to that ticket")?,
        None => {
            output.set_hint("On the receiving side run:\n  ferry receive");
            controller.start_send_wait(&file)?;
        }
    }
    drive(&controller, &mut output).await
}

/// Receive a file from a target, or listen for a sender
async fn receive(
    target: Option<String>,
    dir: PathBuf,
    config: ControllerConfig,
    mut output: Output,
) -> anyhow::Result<()> {
    tracing::info!("Receiving into {}", dir.display());

    let controller = Controller::new(config)?;
    match target {
        Some(target) => controller
            .start_receive_by_target(&target, &dir)
            .context("Cannot receive from that target")?,
        None => {
            output.set_hint("On the sending side run:\n  ferry send <file> --to");
            controller.start_receive_listen(&dir)?;
        }
    }
    drive(&controller, &mut output).await
}

/// Poll events until the session ends; Ctrl+C cancels it
async fn drive(controller: &Controller, output: &mut Output) -> anyhow::Result<()> {
    let mut ticker = time::interval(Duration::from_millis(50));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("Interrupted, cancelling");
                controller.cancel();
            }
            _ = ticker.tick() => {}
        }

        while let Some(event) = controller.poll_event() {
            output.show(&event)?;
            match event.payload {
                EventPayload::Completed { .. } => return Ok(()),
                EventPayload::Cancelled => anyhow::bail!("Transfer cancelled"),
                EventPayload::Failed {
                    error_kind,
                    message,
                } => anyhow::bail!("Transfer failed ({error_kind}): {message}"),
                _ => {}
            }
        }
    }
}

/// Run a rendezvous relay until Ctrl+C
async fn run_relay(bind: SocketAddr, json: bool) -> anyhow::Result<()> {
    let server = RelayServer::bind(bind)
        .await
        .with_context(|| format!("Cannot bind relay on {bind}"))?;
    let local = server.local_addr()?;
    if json {
        println!("{}", serde_json::json!({ "relay": local.to_string() }));
    } else {
        println!("Ferry relay {}", ferry_core::VERSION);
        println!("Listening on {local}");
        println!("Press Ctrl+C to stop");
    }

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Relay shutting down ({} parked session(s))", server.waiting_sessions());
        }
    }
    Ok(())
}

/// Event rendering
enum Output {
    /// One JSON object per line
    Json,
    /// Text and a progress bar
    Human {
        hint: &'static str,
        progress: Option<TransferProgress>,
        started: Option<Instant>,
    },
}

impl Output {
    fn human() -> Self {
        Output::Human {
            hint: "",
            progress: None,
            started: None,
        }
    }

    fn set_hint(&mut self, text: &'static str) {
        if let Output::Human { hint, .. } = self {
            *hint = text;
        }
    }

    fn show(&mut self, event: &Event) -> anyhow::Result<()> {
        let (hint, progress, started) = match self {
            Output::Json => {
                println!("{}", event.to_json()?);
                return Ok(());
            }
            Output::Human {
                hint,
                progress,
                started,
            } => (*hint, progress, started),
        };

        match &event.payload {
            EventPayload::TicketReady { ticket } => {
                println!("Ticket:\n  {ticket}\n");
                if !hint.is_empty() {
                    println!("{hint} {ticket}\n");
                }
                println!("Waiting for peer...");
            }
            EventPayload::PeerConnecting { target } => println!("Connecting to {target}..."),
            EventPayload::PeerConnected {
                peer,
                path,
                verification_code,
                latency_ms,
            } => {
                println!(
                    "Connected to {} ({path}, {latency_ms} ms)",
                    peer.get(..16).unwrap_or(peer.as_str())
                );
                println!("Verification code: {verification_code}");
            }
            EventPayload::Progress {
                bytes_transferred,
                total_bytes,
            } => {
                started.get_or_insert_with(Instant::now);
                progress
                    .get_or_insert_with(|| {
                        TransferProgress::new(*total_bytes, &human_bytes(*total_bytes))
                    })
                    .update(*bytes_transferred);
            }
            EventPayload::Completed {
                path,
                file_name,
                size,
                digest,
            } => {
                let elapsed = started.map(|s| s.elapsed()).unwrap_or_default();
                let summary = format!(
                    "{file_name}: {} in {} ({})",
                    human_bytes(*size),
                    format_duration(elapsed),
                    format_rate(*size, elapsed)
                );
                match progress.take() {
                    Some(bar) => bar.finish_with_message(summary),
                    None => println!("{summary}"),
                }
                println!("Path: {path}");
                println!("BLAKE3: {digest}");
            }
            EventPayload::Cancelled | EventPayload::Failed { .. } => {
                if let Some(bar) = progress.take() {
                    bar.abandon();
                }
            }
        }
        Ok(())
    }
}
