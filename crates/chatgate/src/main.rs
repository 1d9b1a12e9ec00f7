use std::fs;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{info, warn};
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use chatgate::config::{
    APP_NAME, AppConfig, LoggingConfig, default_config_dir, default_data_dir, expand_path,
    write_default_config,
};
use chatgate::server;

#[derive(Debug, Parser)]
#[command(
    version,
    about = "chatgate - AI provider gateway with realtime chat.",
    propagate_version = true
)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/chatgate/config.toml)
    #[arg(long, value_name = "PATH", global = true, env = "CHATGATE_CONFIG")]
    config: Option<PathBuf>,
    /// More log output; repeat for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,
    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API and realtime endpoint
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write a default config file and create the data directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Config {
        #[arg(long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
        return Ok(());
    }

    let config_path = match cli.config {
        Some(path) => expand_path(path)?,
        None => default_config_dir()?.join("config.toml"),
    };

    match cli.command {
        Command::Init { force } => init(&config_path, force),
        Command::Config { format } => {
            let config = AppConfig::load(&config_path)?;
            print_config(&config, format)
        }
        Command::Serve { host, port } => {
            let mut config = AppConfig::load(&config_path)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            init_logging(&config.logging, cli.verbose, cli.quiet, cli.log_json)?;
            if !config_path.exists() {
                warn!(
                    "No config file at {}, running on defaults (see `chatgate init`)",
                    config_path.display()
                );
            }

            tokio::runtime::Runtime::new()
                .context("starting tokio runtime")?
                .block_on(serve(config))
        }
        Command::Completions { .. } => Ok(()),
    }
}

fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    let data_dir = default_data_dir()?;
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    write_default_config(config_path)?;
    println!("wrote {}", config_path.display());
    Ok(())
}

fn print_config(config: &AppConfig, format: ConfigFormat) -> Result<()> {
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(config).context("rendering TOML")?,
        ConfigFormat::Json => serde_json::to_string_pretty(config).context("rendering JSON")?,
        ConfigFormat::Yaml => serde_yaml::to_string(config).context("rendering YAML")?,
    };
    println!("{rendered}");
    Ok(())
}

/// Install the tracing subscriber. `log` records from the realtime and
/// processing modules reach it through the `log` bridge `try_init` sets up.
fn init_logging(logging: &LoggingConfig, verbose: u8, quiet: bool, json: bool) -> Result<()> {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => logging.level.as_str(),
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatgate={level},tower_http={level}")));

    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .boxed()
    } else {
        let color = io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(color)
            .boxed()
    };

    let file = match logging.file {
        Some(ref path) => {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("installing log subscriber")
}

async fn serve(config: AppConfig) -> Result<()> {
    let data_dir = default_data_dir()?;
    let state = server::build_state(&config, &data_dir).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("chatgate listening on http://{}", addr);
    info!("Realtime endpoint at ws://{}{}", addr, config.realtime.path);

    server::serve(listener, state, shutdown_signal()).await
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable ({}), waiting for Ctrl-C only", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    info!("Shutdown requested, closing connections");
}
