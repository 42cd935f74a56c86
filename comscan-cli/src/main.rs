//! comscan CLI - Command-line tool for serial (COM) port inventory.
//!
//! ## Features
//!
//! - List present, absent (previously seen) or all serial ports
//! - Detailed per-port profile: registry friendly name, drivers, USB ids
//! - JSON output for scripting
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comscan::{PortInspector, PresenceFilter};
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

mod commands;
mod config;

use commands::scan::OutputOptions;
use config::Config;

/// Errors with a dedicated process exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation.
    #[error("{0}")]
    Usage(String),
    /// Invalid settings.
    #[error("{0}")]
    Config(String),
    /// Stopped by the user.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Config(_) => 3,
            Self::Cancelled(_) => 130,
        }
    }
}

/// comscan - Serial (COM) port discovery and inventory.
///
/// Environment variables:
///   COMSCAN_CONFIG        - Path to a configuration file
///   COMSCAN_JSON          - Emit JSON instead of text
///   COMSCAN_NO_FALLBACK   - Skip the fallback enumeration command
#[derive(Parser)]
#[command(name = "comscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Emit JSON on stdout.
    #[arg(long, global = true, env = "COMSCAN_JSON")]
    json: bool,

    /// Do not draw a progress bar.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Skip the fallback enumeration command during discovery.
    #[arg(long, global = true, env = "COMSCAN_NO_FALLBACK")]
    no_fallback: bool,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH", env = "COMSCAN_CONFIG")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List ports that are currently present.
    Present,

    /// List ports that were seen before but are not present now.
    Absent,

    /// List every port with full details.
    All {
        /// Show every known field instead of one line per port.
        #[arg(short, long)]
        long: bool,
    },

    /// Discover port identifiers without enriching them.
    Discover,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (detected from $SHELL when omitted).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn build_inspector(cli: &Cli, config: &Config) -> Result<PortInspector> {
    let inspector_config = config.inspector_config(cli.no_fallback);
    debug!("Inspector config: {inspector_config:?}");
    PortInspector::native(inspector_config)
        .map_err(|e| CliError::Config(e.to_string()))
        .context("Invalid scan configuration")
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    let options = OutputOptions {
        json: cli.json,
        quiet: cli.quiet,
        progress: !cli.no_progress
            && config
                .output
                .progress
                .unwrap_or(true),
    };

    match &cli.command {
        Commands::Present => {
            let inspector = build_inspector(cli, &config)?;
            commands::scan::cmd_summary(&inspector, PresenceFilter::Present, options)
        },
        Commands::Absent => {
            let inspector = build_inspector(cli, &config)?;
            commands::scan::cmd_summary(&inspector, PresenceFilter::Absent, options)
        },
        Commands::All { long } => {
            let inspector = build_inspector(cli, &config)?;
            commands::scan::cmd_all(&inspector, *long, options)
        },
        Commands::Discover => {
            let inspector = build_inspector(cli, &config)?;
            commands::scan::cmd_discover(&inspector, options)
        },
        Commands::Completions { shell } => commands::completions::cmd_completions(*shell),
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "comscan v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    comscan::set_interrupt_checker(was_interrupted);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            let code = err
                .downcast_ref::<CliError>()
                .map_or(1, CliError::exit_code);
            ExitCode::from(code)
        },
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_present() {
        let cli = Cli::try_parse_from(["comscan", "present"]).unwrap();
        assert!(matches!(cli.command, Commands::Present));
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_parse_all_long_with_globals() {
        let cli = Cli::try_parse_from([
            "comscan",
            "all",
            "--long",
            "--json",
            "--no-fallback",
            "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::All { long: true }));
        assert!(cli.json);
        assert!(cli.no_fallback);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_parse_config_path() {
        let cli = Cli::try_parse_from(["comscan", "--config", "scan.toml", "discover"]).unwrap();
        assert_eq!(cli.config_path, Some(PathBuf::from("scan.toml")));
        assert!(matches!(cli.command, Commands::Discover));
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["comscan", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions {
                shell: Some(Shell::Zsh)
            }
        ));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["comscan"]).is_err());
        assert!(Cli::try_parse_from(["comscan", "flash"]).is_err());
    }

    // ---- exit codes ----

    #[test]
    fn test_cli_error_exit_codes() {
        assert_eq!(CliError::Usage(String::new()).exit_code(), 2);
        assert_eq!(CliError::Config(String::new()).exit_code(), 3);
        assert_eq!(CliError::Cancelled(String::new()).exit_code(), 130);
    }

    #[test]
    fn test_invalid_marker_is_config_error() {
        let cli = Cli::try_parse_from(["comscan", "discover"]).unwrap();
        let mut config = Config::default();
        config.discovery.port_marker = Some(String::new());

        let err = build_inspector(&cli, &config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Config(_))
        ));
    }
}
