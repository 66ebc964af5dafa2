//! Binary entrypoint for the dectgw CLI.
//!
//! Commands:
//! - `start [--bind <addr>] [--port <n>]` - run the gateway until Ctrl-C
//! - `init` - write a starter `config.toml`
//! - `check-config` - validate the configuration and print the effective settings
//!
//! See the library crate docs for module‑level details: `dectgw::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use dectgw::config::Config;
use dectgw::gateway::Gateway;

#[derive(Parser)]
#[command(name = "dectgw")]
#[command(about = "Store-and-forward messaging gateway for DECT base stations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Start {
        /// Address to bind (overrides gateway.bind_address)
        #[arg(short, long)]
        bind: Option<String>,

        /// UDP port (overrides gateway.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write a default configuration file
    Init,
    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { bind, port } => {
            let mut config = match Config::load(&cli.config).await {
                Ok(config) => {
                    init_logging(&config, cli.verbose);
                    config
                }
                Err(e) => {
                    let config = Config::default();
                    init_logging(&config, cli.verbose);
                    warn!("{} (starting with default configuration)", e);
                    config
                }
            };
            if let Some(bind) = bind {
                config.gateway.bind_address = bind;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            config.validate()?;

            info!("Starting dectgw v{}", env!("CARGO_PKG_VERSION"));
            let mut gateway = Gateway::bind(config).await?;
            gateway.run().await?;
        }
        Commands::Init => {
            init_logging(&Config::default(), cli.verbose);
            if tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                warn!("{} already exists; not overwriting", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::CheckConfig => {
            let config = Config::load(&cli.config).await?;
            init_logging(&config, cli.verbose);
            config.validate()?;
            println!("{}", toml::to_string_pretty(&config)?);
            info!("{} is valid", cli.config);
        }
    }

    Ok(())
}

fn init_logging(config: &Config, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let level = match verbosity {
        0 => config.logging.level_filter(),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config.logging.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Cannot open log file {}: {}", path, e))
            .ok()
    });

    if let Some(f) = log_file {
        let file = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Only echo to the console when someone is watching it
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
