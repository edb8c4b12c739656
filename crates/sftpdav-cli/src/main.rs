#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
// Disable with `--no-default-features` if debugging allocator issues.
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod exit_code;

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "tokio-console")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sftpdav::{
    AdaptorOptions, CacheStats, ConnectOptions, RemoteSession, SessionError, SftpWebDav,
    WebDavServer, DEFAULT_PORT,
};

use crate::config::{ConfigError, FileConfig};

/// Serve a remote host's home directory over WebDAV, via SFTP
#[derive(Parser, Debug)]
#[command(name = "sftpdav")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Serve alice's home directory on http://127.0.0.1:8888
    sftpdav alice@files.example.com

    # Non-standard SSH port and an explicit key
    sftpdav --key ~/.ssh/id_work bob@10.0.0.5:2222

    # Listen on all interfaces
    sftpdav --listen 0.0.0.0:8080 files.example.com

    # Password from the environment
    SFTPDAV_PASSWORD=\"$SECRET\" sftpdav carol@files.example.com
")]
struct Cli {
    /// Remote host as [user[:password]@]host[:port]
    #[arg(value_name = "TARGET")]
    target: String,

    /// Remote user (when TARGET names none; defaults to the local user)
    #[arg(short, long, env = "SFTPDAV_USER")]
    user: Option<String>,

    /// Private key (defaults to the only id_* key in ~/.ssh)
    #[arg(short = 'i', long, value_name = "PATH", env = "SFTPDAV_KEY")]
    key: Option<PathBuf>,

    /// Password (insecure on the command line, prefer SFTPDAV_PASSWORD)
    #[arg(long, env = "SFTPDAV_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Local address to serve WebDAV on [default: 127.0.0.1:8888]
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Configuration file [default: <config dir>/sftpdav/config.toml]
    #[arg(short, long, value_name = "PATH", env = "SFTPDAV_CONFIG")]
    config: Option<PathBuf>,

    /// Octal permission bits for directories created by clients [default: 755]
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    dir_mode: Option<u32>,

    /// Octal permission bits for files created by clients [default: 644]
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    file_mode: Option<u32>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

/// Parse an octal mode such as `755`, `0755` or `0o755`
fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    let mode = u32::from_str_radix(digits, 8).map_err(|_| format!("'{s}' is not an octal mode"))?;
    if mode > 0o7777 {
        return Err(format!("mode '{s}' has bits outside 7777"));
    }
    Ok(mode)
}

/// Everything needed to start serving, after merging flags and file
#[derive(Debug)]
struct Settings {
    connect: ConnectOptions,
    listen: SocketAddr,
    options: AdaptorOptions,
}

impl Settings {
    /// Merge command-line values over file values over defaults
    fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, SessionError> {
        let defaults = AdaptorOptions::default();
        let connect = ConnectOptions::new(&cli.target)?
            .with_user(cli.user.clone().or(file.user))
            .with_key(cli.key.clone().or(file.key))
            .with_password(cli.password.clone().or(file.password));

        Ok(Self {
            connect,
            listen: cli
                .listen
                .or(file.listen)
                .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))),
            options: AdaptorOptions {
                dir_mode: cli.dir_mode.or(file.dir_mode).unwrap_or(defaults.dir_mode),
                file_mode: cli.file_mode.or(file.file_mode).unwrap_or(defaults.file_mode),
            },
        })
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            // Determine appropriate exit code based on error type
            let code = categorize_error(&e);

            // Only print error if not quiet mode (quiet is parsed separately for this)
            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity (skip if quiet)
    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let file = config::load(cli.config.as_deref())?;
    let settings = Settings::resolve(&cli, file)?;
    tracing::debug!(?settings, "Resolved settings");

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(serve(settings, cli.quiet))
}

/// Connect, serve until Ctrl-C, then shut down
async fn serve(settings: Settings, quiet: bool) -> Result<()> {
    let address = settings.connect.descriptor.address.clone();
    let session = RemoteSession::connect(settings.connect)
        .await
        .with_context(|| format!("Failed to establish session with {address}"))?;

    let fs = SftpWebDav::with_options(session, settings.options);
    let server = WebDavServer::start(fs.clone(), settings.listen.into())
        .await
        .with_context(|| format!("Failed to listen on {}", settings.listen))?;

    if !quiet {
        println!("Serving {}:{} at {}", address, fs.session().home(), server.url());
        println!("Press Ctrl-C to stop");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;
    tracing::info!("Interrupted, shutting down");

    server.stop().await;
    log_cache_stats(fs.session().cache().stats());
    fs.session().disconnect().await;
    Ok(())
}

fn log_cache_stats(stats: &CacheStats) {
    tracing::info!(
        hits = stats.hit_count(),
        misses = stats.miss_count(),
        stores = stats.store_count(),
        hit_rate = format!("{:.1}%", stats.hit_rate() * 100.0),
        "Directory cache statistics"
    );
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    #[cfg(feature = "tokio-console")]
    {
        use tracing_subscriber::Layer;

        let console_port: u16 = std::env::var("TOKIO_CONSOLE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(6669);

        let console_addr: SocketAddr = ([127, 0, 0, 1], console_port).into();
        let port_available = std::net::TcpListener::bind(console_addr).is_ok();

        let fmt_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

        if port_available {
            let console_layer = console_subscriber::ConsoleLayer::builder()
                .server_addr(console_addr)
                .spawn();
            tracing_subscriber::registry()
                .with(console_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_filter(fmt_filter),
                )
                .init();
            tracing::info!(
                "tokio-console enabled, connect with: tokio-console http://127.0.0.1:{}",
                console_port
            );
        } else {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_filter(fmt_filter),
                )
                .init();
            tracing::warn!(
                "tokio-console port {} already in use, running without console instrumentation.",
                console_port
            );
        }
    }

    #[cfg(not(feature = "tokio-console"))]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(session_err) = cause.downcast_ref::<SessionError>() {
            return match session_err {
                SessionError::Connection(_) => exit_code::CONNECTION_FAILED,
                SessionError::ConfigParse(_) => exit_code::CONFIG_INVALID,
                SessionError::Io(io_err) if io_err.kind() == io::ErrorKind::PermissionDenied => {
                    exit_code::PERMISSION_DENIED
                }
                SessionError::Io(_) => exit_code::GENERAL_ERROR,
            };
        }

        if cause.downcast_ref::<ConfigError>().is_some() {
            return exit_code::CONFIG_INVALID;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::AddrInUse => return exit_code::ADDRESS_IN_USE,
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                io::ErrorKind::Interrupted => return exit_code::CANCELLED,
                _ => {}
            }
        }
    }

    exit_code::GENERAL_ERROR
}
