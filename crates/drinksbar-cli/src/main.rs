#![deny(unsafe_code)]

//! drinksbar CLI: serves the stream and datagram endpoints once and
//! reports what arrived.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use drinksbar_config::{AppConfig, ConfigError, OversizePolicy};
use drinksbar_core::{PeerClient, Service, ServiceError, ServiceEvent, TransportKind};

const USAGE: &str = "Usage: drinksbar -T <tcp_port> -U <udp_port> [--oxygen <n>] [--carbon <n>] \
[--hydrogen <n>] [--timeout <sec>] [--stream-path <path>] [--datagram-path <path>]";

/// drinksbar, a local IPC endpoint with one stream and one datagram socket.
#[derive(Parser)]
#[command(name = "drinksbar", version, about, long_about = None, disable_help_flag = true)]
struct Cli {
    /// TCP port (required, reserved for the inventory protocol).
    #[arg(short = 'T', long)]
    tcp_port: Option<u16>,

    /// UDP port (required, reserved for the inventory protocol).
    #[arg(short = 'U', long)]
    udp_port: Option<u16>,

    /// Oxygen atoms in stock.
    #[arg(short, long)]
    oxygen: Option<u64>,

    /// Carbon atoms in stock.
    #[arg(short, long)]
    carbon: Option<u64>,

    /// Hydrogen atoms in stock.
    #[arg(short = 'h', long)]
    hydrogen: Option<u64>,

    /// Give up after this many seconds (0 = wait forever).
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Filesystem path for the stream socket.
    #[arg(short, long)]
    stream_path: Option<PathBuf>,

    /// Filesystem path for the datagram socket.
    #[arg(short, long)]
    datagram_path: Option<PathBuf>,

    /// Maximum payload bytes kept per receive.
    #[arg(long)]
    max_payload: Option<usize>,

    /// Discard oversize messages instead of truncating them.
    #[arg(long)]
    reject_oversize: bool,

    /// Optional TOML configuration file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print help.
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Send one message to a running endpoint.
    Send {
        /// Which transport the endpoint speaks.
        #[arg(value_enum)]
        transport: Transport,

        /// Socket path of the endpoint.
        path: PathBuf,

        /// Message text.
        message: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Stream,
    Datagram,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[!] Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(cli.verbose, &config.logging.level);

    match cli.command {
        None => serve(config).await,
        Some(Commands::Config { show }) => exit_with(cmd_config(&config, show)),
        Some(Commands::Send {
            transport,
            path,
            message,
        }) => exit_with(cmd_send(transport, &path, &message).await),
    }
}

fn init_tracing(verbose: u8, configured: &str) {
    let filter = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn exit_with(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[!] Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, cli);
    Ok(config)
}

/// Layer command-line flags over file (or default) values.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(port) = cli.tcp_port {
        config.ports.tcp_port = Some(port);
    }
    if let Some(port) = cli.udp_port {
        config.ports.udp_port = Some(port);
    }
    if let Some(n) = cli.oxygen {
        config.inventory.oxygen = n;
    }
    if let Some(n) = cli.carbon {
        config.inventory.carbon = n;
    }
    if let Some(n) = cli.hydrogen {
        config.inventory.hydrogen = n;
    }
    if let Some(secs) = cli.timeout {
        config.service.timeout_secs = secs;
    }
    if let Some(path) = &cli.stream_path {
        config.uds.stream_path = Some(path.clone());
    }
    if let Some(path) = &cli.datagram_path {
        config.uds.datagram_path = Some(path.clone());
    }
    if let Some(max) = cli.max_payload {
        config.payload.max_bytes = max;
    }
    if cli.reject_oversize {
        config.payload.oversize = OversizePolicy::Reject;
    }
}

async fn serve(config: AppConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        report_config_error(&e);
        return ExitCode::FAILURE;
    }
    print_configuration(&config);

    let service = Service::new(config);
    let printer = tokio::spawn(print_events(service.subscribe()));
    let result = service.run().await;

    // Dropping the service closes the event channel and lets the printer drain.
    drop(service);
    let _ = printer.await;

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            match &e {
                ServiceError::DeadlineExceeded(_) => eprintln!("\n[!] Timeout reached. Exiting..."),
                ServiceError::Config(config_error) => report_config_error(config_error),
                other => eprintln!("[!] Error: {other}"),
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn report_config_error(e: &ConfigError) {
    eprintln!("[!] Error: {e}.");
    if matches!(e, ConfigError::MissingPorts) {
        eprintln!("{USAGE}");
    }
}

fn print_configuration(config: &AppConfig) {
    let port = |p: Option<u16>| p.map(|p| p.to_string()).unwrap_or_default();
    println!("UDS Configuration Loaded:");
    println!("  TCP Port      : {}", port(config.ports.tcp_port));
    println!("  UDP Port      : {}", port(config.ports.udp_port));
    println!("  Oxygen        : {}", config.inventory.oxygen);
    println!("  Carbon        : {}", config.inventory.carbon);
    println!("  Hydrogen      : {}", config.inventory.hydrogen);
    println!("  Timeout (sec) : {}", config.service.timeout_secs);
    if let Some(path) = config.uds.stream_path() {
        println!("  Stream Path   : {}", path.display());
    }
    if let Some(path) = config.uds.datagram_path() {
        println!("  Datagram Path : {}", path.display());
    }

    if config.service.timeout_secs > 0 {
        println!("[*] Timeout set to {} seconds.", config.service.timeout_secs);
    }
}

fn label(kind: TransportKind) -> &'static str {
    match kind {
        TransportKind::Stream => "Stream",
        TransportKind::Datagram => "Datagram",
    }
}

async fn print_events(mut events: broadcast::Receiver<ServiceEvent>) {
    loop {
        match events.recv().await {
            Ok(ServiceEvent::Ready { kind, path }) => {
                println!("[+] {} socket ready at: {}", label(kind), path.display());
            }
            Ok(ServiceEvent::Received { kind, payload }) => {
                println!("[{kind}] Received: {payload}");
                if payload.is_truncated() {
                    println!("[{kind}] (message truncated to {} bytes)", payload.len());
                }
            }
            Ok(ServiceEvent::NothingReceived { .. } | ServiceEvent::Closed { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn cmd_config(config: &AppConfig, show: bool) -> Result<()> {
    config.validate()?;
    if show {
        let toml_str = toml::to_string_pretty(config).context("serializing configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration is valid.");
    }
    Ok(())
}

async fn cmd_send(transport: Transport, path: &Path, message: &str) -> Result<()> {
    let client = PeerClient::new(path);
    match transport {
        Transport::Stream => client.send_stream(message.as_bytes()).await?,
        Transport::Datagram => {
            client.send_datagram(message.as_bytes()).await?;
        }
    }
    info!(path = %path.display(), "Message sent");
    Ok(())
}
