//! probectl
//!
//! Lists, opens and talks to USB HID debug probes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hidlink::{DeviceAccessProvider, ProbeSession};
use probectl::commands;
use probectl::config::Config;

/// probectl - USB HID debug probe sessions from the command line.
#[derive(Parser, Debug)]
#[command(name = "probectl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Report whether HID device access is available
    Check,

    /// Request a grant and list the opened devices
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Send one raw request report and print the response
    Transact {
        /// Request bytes as hex, e.g. "00 fe"
        request: String,

        /// Index of the granted device to use
        #[arg(long, short)]
        device: Option<usize>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Initialize tracing before overrides so their messages are emitted
    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    config.apply_env_overrides();
    config.validate()?;

    let session = Arc::new(open_session(&config));
    tracing::debug!(session_id = %session.id(), "Session ready");

    // Ctrl-C ends the session; in-flight commands observe it below.
    {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted");
                session.close_session();
            }
        });
    }

    let result = run(&cli.command, &config, &session).await;
    session.close_session();
    result
}

async fn run<P: DeviceAccessProvider>(
    command: &Commands,
    config: &Config,
    session: &ProbeSession<P>,
) -> anyhow::Result<()> {
    match command {
        Commands::Check => {
            let available = session.is_available();
            println!("{}", commands::render_check(available));
            if !available {
                std::process::exit(1);
            }
        }
        Commands::List { json } => {
            let devices = tokio::select! {
                devices = commands::list_devices(session) => devices?,
                _ = session.session_ended() => anyhow::bail!("Interrupted"),
            };
            println!("{}", commands::render_devices(&devices, *json)?);
        }
        Commands::Transact { request, device } => {
            let request = commands::parse_hex(request)?;
            let index = device.unwrap_or(config.probe.device_index);
            tracing::debug!(index, len = request.len(), "Sending request");

            let response = tokio::select! {
                response = commands::transact(session, index, &request) => response?,
                _ = session.session_ended() => anyhow::bail!("Interrupted"),
            };
            println!("{}", commands::format_hex(&response));
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}

#[cfg(feature = "hidapi")]
fn open_session(config: &Config) -> ProbeSession<hidlink::HidApiProvider> {
    let provider = hidlink::HidApiProvider::new(config.probe.report_size)
        .with_allow_list(config.probe.allow_filters());
    let capability = provider.clone();
    ProbeSession::with_options(provider, capability, config.probe.session_options())
}

#[cfg(not(feature = "hidapi"))]
fn open_session(config: &Config) -> ProbeSession<hidlink::MemoryProvider> {
    tracing::warn!("Built without a native HID backend; rebuild with --features hidapi");
    ProbeSession::with_options(
        hidlink::MemoryProvider::new(),
        hidlink::StaticCapability::UNAVAILABLE,
        config.probe.session_options(),
    )
}
