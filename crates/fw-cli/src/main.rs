//! CLI entry point for the fw file watcher.
//!
//! This binary wires command-line filter rules and a JSON configuration file
//! into a [`Watcher`] and prints every accepted event to stdout.
//!
//! # Usage
//!
//! ```bash
//! fw [OPTIONS] <COMMAND>
//!
//! # Print created and modified .log files under two directories
//! fw watch /var/log /srv/app/logs --include-ext .log --events create,modify
//!
//! # Watch for 30 seconds, skipping editor swap files
//! fw watch . --recursive --not-contains .swp --duration 30
//!
//! # Show the effective configuration
//! fw --config fw.json config --by-origin
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::eyre;
use fw_core::{Behavior, EventKind, Routing, WatcherConfig};
use fw_watcher::{DispatchStats, EventSource, Watcher, WatcherState};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watch directories and print filtered filesystem events.
#[derive(Parser)]
#[command(name = "fw", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file.
    ///
    /// Flags given on the command line override values from the file.
    #[arg(short, long, global = true, env = "FW_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch paths and print accepted events until interrupted.
    Watch(WatchArgs),

    /// Print the effective configuration as JSON.
    Config {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

/// Configuration values that can be set from flags.
#[derive(Args)]
struct ConfigOverrides {
    /// Watch subdirectories too.
    #[arg(short, long)]
    recursive: bool,

    /// Route events only to the path that produced them.
    #[arg(long)]
    by_origin: bool,

    /// Log watcher lifecycle at info level.
    #[arg(long)]
    debug: bool,

    /// Dispatch loop poll interval in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

/// Arguments of `fw watch`.
///
/// Every rule applies to every path.
#[derive(Args)]
struct WatchArgs {
    /// Directories to watch.
    #[arg(required = true)]
    paths: Vec<Utf8PathBuf>,

    /// Accept only names ending with one of these suffixes.
    #[arg(long, value_name = "EXT")]
    include_ext: Vec<String>,

    /// Reject names ending with any of these suffixes.
    #[arg(long, value_name = "EXT")]
    exclude_ext: Vec<String>,

    /// Accept only names containing one of these substrings.
    #[arg(long, value_name = "TEXT")]
    contains: Vec<String>,

    /// Reject names containing any of these substrings.
    #[arg(long, value_name = "TEXT")]
    not_contains: Vec<String>,

    /// Accept only these exact names.
    #[arg(long, value_name = "NAME")]
    equal: Vec<String>,

    /// Reject these exact names.
    #[arg(long, value_name = "NAME")]
    unequal: Vec<String>,

    /// Event kinds to report.
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = "create,delete,access,modify"
    )]
    events: Vec<EventKind>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects `RUST_LOG` if set. Otherwise uses `debug` with `--verbose` and
/// `info` by default. Logs go to stderr so stdout carries only events.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds the effective [`WatcherConfig`] from the config file and flags.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result is invalid.
fn build_config(
    file: Option<&Utf8PathBuf>,
    overrides: &ConfigOverrides,
) -> color_eyre::Result<WatcherConfig> {
    let mut config = match file {
        Some(path) => WatcherConfig::load(path)
            .map_err(|e| eyre!("Failed to load config {}: {}", path, e))?,
        None => WatcherConfig::default(),
    };

    config.recursive |= overrides.recursive;
    config.debug |= overrides.debug;
    if overrides.by_origin {
        config.routing = Routing::ByOrigin;
    }
    if let Some(ms) = overrides.poll_interval_ms {
        config.poll_interval_ms = ms;
    }

    config
        .validate()
        .map_err(|e| eyre!("Invalid configuration: {}", e))?;
    Ok(config)
}

/// Returns a handler printing `kind`, the watched path and the name.
fn print_handler(kind: EventKind, path: String) -> impl Fn(&str) + Send + Sync + 'static {
    move |name: &str| {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = writeln!(handle, "{kind}\t{path}\t{name}");
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Builds a watcher from `args`, runs it until interrupted and prints its
/// statistics.
///
/// # Errors
///
/// Returns an error if a rule is invalid or a path cannot be watched.
async fn run_watch(config: WatcherConfig, args: WatchArgs) -> color_eyre::Result<()> {
    let mut watcher =
        Watcher::new(config).map_err(|e| eyre!("Failed to create watcher: {}", e))?;

    for path in &args.paths {
        let mut builder = watcher
            .watch(path)?
            .filter_by_extension(Behavior::Include, &args.include_ext[..])?
            .filter_by_extension(Behavior::Exclude, &args.exclude_ext[..])?
            .filter_by_filename(Behavior::Include, &args.contains[..])?
            .filter_by_filename(Behavior::Exclude, &args.not_contains[..])?
            .filter_by_filename(Behavior::Equal, &args.equal[..])?
            .filter_by_filename(Behavior::Unequal, &args.unequal[..])?;
        let label = builder.path().to_string();
        for &kind in &args.events {
            builder = builder.on(kind, print_handler(kind, label.clone()));
        }
    }

    watcher
        .start(Behavior::Normal)
        .map_err(|e| eyre!("Failed to start watcher: {}", e))?;
    info!(paths = args.paths.len(), events = ?args.events, "Watching");

    wait_for_shutdown(&watcher, args.duration).await?;

    let stats = watcher.stop().await?;
    print_stats(&stats)
}

/// Interval at which the CLI checks whether the dispatch loop ended on its own.
const LOOP_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Resolves once the dispatch loop has exited without being asked to.
async fn loop_exited<S: EventSource>(watcher: &Watcher<S>) {
    let mut tick = tokio::time::interval(LOOP_CHECK_INTERVAL);
    loop {
        tick.tick().await;
        if watcher.state() == WatcherState::Stopped {
            return;
        }
    }
}

/// Waits for Ctrl-C, SIGTERM (Unix), the optional duration, or the dispatch
/// loop ending by itself.
async fn wait_for_shutdown<S: EventSource>(
    watcher: &Watcher<S>,
    duration: Option<u64>,
) -> color_eyre::Result<()> {
    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
            () = deadline => {
                info!("Duration elapsed, shutting down");
            }
            () = loop_exited(watcher) => {
                tracing::warn!("Dispatch loop ended, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            () = deadline => {
                info!("Duration elapsed, shutting down");
            }
            () = loop_exited(watcher) => {
                tracing::warn!("Dispatch loop ended, shutting down");
            }
        }
    }

    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints dispatch statistics as pretty JSON.
fn print_stats(stats: &DispatchStats) -> color_eyre::Result<()> {
    let json = serde_json::to_string_pretty(stats)
        .map_err(|e| eyre!("Failed to serialize stats: {}", e))?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(())
}

/// Prints the effective configuration as pretty JSON.
fn run_config(config: &WatcherConfig) -> color_eyre::Result<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Install color-eyre before anything can fail
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_color);

    match cli.command {
        Commands::Watch(args) => {
            let config = build_config(cli.config.as_ref(), &args.overrides)?;
            run_watch(config, args).await
        }
        Commands::Config { overrides } => {
            let config = build_config(cli.config.as_ref(), &overrides)?;
            run_config(&config)
        }
    }
}
