//! hexlink CLI - Upload line-oriented firmware images over a serial link.
//!
//! ## Features
//!
//! - One acknowledged line at a time, fail-fast on device silence
//! - Configuration files and environment variable support
//! - Progress display and machine-readable (`--json`) summary
//! - Internationalization (i18n) support

use anyhow::Result;
use clap::{Parser, ValueEnum};
use console::style;
use env_logger::Env;
use hexlink::LineEnding;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use config::Config;

// Initialize i18n with locale files from the locales directory
rust_i18n::i18n!("locales", fallback = "en");

/// Failures with a dedicated process exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation.
    #[error("{0}")]
    Usage(String),
    /// Configuration file or values rejected.
    #[error("{0}")]
    Config(String),
    /// Serial port could not be opened.
    #[error("{0}")]
    PortOpen(String),
    /// The transfer started but did not complete.
    #[error("{0}")]
    Transfer(String),
}

impl CliError {
    /// Process exit code for this failure.
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            Self::Transfer(_) => 1,
            Self::Usage(_) => 2,
            Self::Config(_) => 3,
            Self::PortOpen(_) => 4,
        }
    }
}

/// Map any command error to an exit code; unclassified errors exit with 1.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

/// hexlink - Upload a text-encoded firmware image line by line over serial.
///
/// Each line is sent and must be answered by the device (normally with
/// "ok") within the timeout before the next line goes out.
///
/// Environment variables:
///   HEXLINK_PORT   - Serial port (default: /dev/ttyUSB0)
///   HEXLINK_BAUD   - Baud rate (default: 9600)
///   HEXLINK_LANG   - Language/locale (en, zh-CN)
#[derive(Parser, Debug)]
#[command(name = "hexlink")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Exit codes: 0 success, 1 transfer failed, 2 usage, 3 config, 4 port")]
pub(crate) struct Cli {
    /// Path to the image file (e.g. firmware.hex).
    pub(crate) image: PathBuf,

    /// Serial port to use.
    #[arg(short, long, env = "HEXLINK_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate.
    #[arg(short, long, env = "HEXLINK_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Milliseconds to wait for the reply to each line.
    #[arg(long, value_name = "MS")]
    pub(crate) timeout_ms: Option<u64>,

    /// Terminator sent after each line.
    #[arg(long, value_enum)]
    pub(crate) line_ending: Option<LineEndingArg>,

    /// Language/locale for messages (e.g., en, zh-CN).
    #[arg(long, env = "HEXLINK_LANG")]
    pub(crate) lang: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long)]
    pub(crate) quiet: bool,

    /// Print the transfer summary as JSON to stdout.
    #[arg(long)]
    pub(crate) json: bool,

    /// Path to a configuration file.
    #[arg(long = "config", value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,
}

/// Line terminators selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LineEndingArg {
    /// "\n" (default).
    Lf,
    /// "\r\n".
    Crlf,
    /// No terminator.
    None,
}

impl From<LineEndingArg> for LineEnding {
    fn from(arg: LineEndingArg) -> Self {
        match arg {
            LineEndingArg::Lf => LineEnding::Lf,
            LineEndingArg::Crlf => LineEnding::CrLf,
            LineEndingArg::None => LineEnding::None,
        }
    }
}

/// Supported locales for i18n
const SUPPORTED_LOCALES: &[&str] = &["en", "zh-CN"];

/// Detect the best matching locale from system settings.
///
/// - `zh_CN.UTF-8` -> `zh-CN`
/// - `zh` -> `zh-CN`
/// - `en_US.UTF-8` -> `en`
/// - `C` or `POSIX` -> `en`
fn detect_locale() -> String {
    let system_locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    match_locale(&system_locale)
}

/// Normalize a locale string to one of [`SUPPORTED_LOCALES`].
fn match_locale(raw: &str) -> String {
    // Remove encoding suffix (e.g., .UTF-8)
    let locale = raw.split('.').next().unwrap_or(raw);

    // Replace underscore with hyphen for BCP 47 format
    let locale = locale.replace('_', "-");

    if SUPPORTED_LOCALES.contains(&locale.as_str()) {
        return locale;
    }

    let lang_code = locale.split('-').next().unwrap_or(&locale);

    match lang_code.to_lowercase().as_str() {
        "zh" => "zh-CN".to_string(),
        _ => "en".to_string(),
    }
}

/// Default log filter for the given verbosity.
///
/// Per-line diagnostics are printed by the upload command itself, so the
/// engine's own log lines only show from `-v` on.
fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "warn,hexlink::transfer=off"
    } else {
        match verbose {
            0 => "info,hexlink::transfer=off",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn main() -> ExitCode {
    // clap exits with code 2 on usage errors and 0 for --help/--version
    let cli = Cli::parse();

    let locale = cli
        .lang
        .clone()
        .unwrap_or_else(detect_locale);
    rust_i18n::set_locale(&match_locale(&locale));

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(log_filter(cli.verbose, cli.quiet)))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "hexlink v{} (verbose level: {}, locale: {locale})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config_path {
        Some(path) => {
            Config::load_from_path(path).map_err(|e| CliError::Config(format!("{e:#}")))?
        },
        None => Config::load(),
    };

    commands::upload::cmd_upload(cli, &config)
}
