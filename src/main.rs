//! termbridge CLI - bridges a terminal host to a remote UI client.
//!
//! This is the main binary entry point. See the `termbridge` library for
//! the core functionality.
//!
//! - `termbridge serve [SOCKET]` - run the hub against the local tmux server
//! - `termbridge capture <SESSION_ID> <ENDPOINT>` - capture helper started by
//!   the host for each session

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;
use termbridge::config::{ensure_private_dir, Config};
use termbridge::host::{TerminalHost, TmuxHost};
use termbridge::hub::{Hub, HubHandle, HubOptions};
use termbridge::socket::ControlServer;
use termbridge::transport::capture;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => run_serve(args),
        Commands::Capture { session_id, endpoint } => run_capture(&session_id, &endpoint),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("termbridge: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Log to `TERMBRIDGE_LOG_FILE` when set, otherwise to stderr.
///
/// Never stdout: the capture helper's stdout is session input.
fn init_logging() {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    if let Ok(path) = std::env::var("TERMBRIDGE_LOG_FILE") {
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("termbridge: cannot open log file {path}: {e}; logging to stderr"),
        }
    }
    builder.init();
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(socket) = args.socket {
        config.socket_path = Some(socket);
    }
    if let Some(helper) = args.helper {
        config.helper_program = Some(helper);
    }
    if let Some(dir) = args.endpoint_dir {
        config.endpoint_dir = Some(dir);
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval_ms = ms;
    }

    let helper = config.helper_program()?;
    check_helper(&helper)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    runtime.block_on(serve(config, helper))
}

async fn serve(config: Config, helper: PathBuf) -> Result<()> {
    let host = TmuxHost::new(config.poll_interval()).with_binary(config.tmux_binary.clone());
    let topology = host
        .topology()
        .await
        .context("Terminal host is not reachable")?;
    log::info!(
        "[Main] Terminal host reachable: {} window(s), {} session(s)",
        topology.windows.len(),
        topology.session_count()
    );

    let endpoint_dir = config.endpoint_dir();
    ensure_private_dir(&endpoint_dir)?;
    let socket_path = config.socket_path();
    if let Some(parent) = socket_path.parent() {
        ensure_private_dir(parent)?;
    }
    let server = ControlServer::bind(&socket_path)
        .with_context(|| format!("Failed to bind control socket {}", socket_path.display()))?;

    let options = HubOptions {
        endpoint_dir,
        helper_program: helper,
        read_buffer: config.read_buffer,
    };
    let mut hub = Hub::new(Arc::new(host), options);
    let handle = hub.handle();
    tokio::spawn(shutdown_on_signal(handle));

    println!("termbridge listening on {}", socket_path.display());
    hub.run(server).await;
    log::info!("[Main] Shutdown complete");
    Ok(())
}

/// Stop the hub on SIGINT, SIGTERM or SIGHUP.
async fn shutdown_on_signal(handle: HubHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm, mut sighup) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(int), Ok(term), Ok(hup)) => (int, term, hup),
        _ => {
            log::warn!("[Main] Cannot install signal handlers");
            return;
        }
    };

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sighup.recv() => "SIGHUP",
    };
    log::info!("[Main] {name} received, shutting down");
    handle.shutdown();
}

/// The helper must exist and be executable; the host runs it per session.
fn check_helper(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Helper program not found: {}", path.display()))?;
    if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
        anyhow::bail!("Helper program is not executable: {}", path.display());
    }
    Ok(())
}

fn run_capture(session_id: &str, endpoint: &Path) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    runtime
        .block_on(capture::run(session_id, endpoint))
        .with_context(|| format!("Capture for session {session_id} failed"))
}

// CLI
#[derive(Parser)]
#[command(name = "termbridge")]
#[command(version)]
#[command(about = "Bridge terminal sessions to a remote UI client over JSON lines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge against the local tmux server
    Serve(ServeArgs),
    /// Relay one session's I/O to its endpoint (started by the host)
    Capture {
        /// Host session identifier
        session_id: String,
        /// Endpoint socket to connect to
        endpoint: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Control socket path (default: /tmp/termbridge-<uid>/bridge.sock)
    socket: Option<PathBuf>,
    /// Capture helper program (default: this executable)
    #[arg(long)]
    helper: Option<PathBuf>,
    /// Directory for per-session endpoints
    #[arg(long)]
    endpoint_dir: Option<PathBuf>,
    /// tmux polling interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}
