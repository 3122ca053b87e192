//! zlabel - offline repair of pool device labels.
//!
//! Recomputes label checksums and restores the bootstrap uberblock txg on a
//! device whose pool can no longer be imported.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::env::VarError;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zlabel::{repair_device, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    const ENV_KEY: &'static str = "ZLABEL_LOG_FORMAT";

    fn parse(raw: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(raw.trim(), true).map_err(|_| {
            anyhow::anyhow!(
                "invalid {key}={raw:?}; expected one of: human, json",
                key = Self::ENV_KEY
            )
        })
    }

    fn from_env() -> Result<Option<Self>> {
        match std::env::var(Self::ENV_KEY) {
            Ok(value) => Ok(Some(Self::parse(&value)?)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                bail!("{key} contains non-UTF-8 bytes", key = Self::ENV_KEY)
            }
        }
    }
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Logs go to stderr so stdout carries only the report.
fn init_logging(log_format_override: Option<LogFormat>) -> Result<LogFormat> {
    let format = log_format_override
        .or(LogFormat::from_env()?)
        .unwrap_or(LogFormat::Human);

    match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .compact()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize human logger: {err}"))?,
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize JSON logger: {err}"))?,
    }

    Ok(format)
}

#[derive(Parser)]
#[command(name = "zlabel")]
#[command(author, version, long_about = None)]
#[command(about = "Offline repair tool for pool device labels")]
struct Cli {
    /// Read pool configuration from this cache file
    #[arg(short = 'c', long, global = true)]
    cachefile: Option<PathBuf>,

    /// Search this directory for pool devices (repeatable)
    #[arg(short = 'd', long = "dir", global = true)]
    search_dirs: Vec<PathBuf>,

    /// Log output format (`human` or `json`).
    ///
    /// Precedence: `--log-format` > `ZLABEL_LOG_FORMAT` > `human`.
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label operations
    Label {
        #[command(subcommand)]
        command: LabelCommands,
    },
}

#[derive(Subcommand)]
enum LabelCommands {
    /// Repair label checksums and the bootstrap uberblock txg
    #[command(
        long_about = "Repair corrupted label checksums and restore a zeroed uberblock txg.\n\n\
        Each of the four labels is handled independently. The txg of the first \
        uberblock in each ring is taken from its root block pointer's birth txg, \
        and only sub-regions whose checksum was wrong are written back.\n\n\
        Exits 0 if anything was repaired and 1 otherwise."
    )]
    Repair {
        /// Device or image file holding the labels
        device: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("zlabel: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    init_logging(cli.log_format)?;
    let session = Session::new(cli.cachefile, cli.search_dirs);

    match cli.command {
        Commands::Label { command } => match command {
            LabelCommands::Repair { device, json } => cmd_label_repair(&session, &device, json),
        },
    }
}

fn cmd_label_repair(session: &Session, device: &Path, json: bool) -> Result<i32> {
    if session.has_import_options() {
        debug!(?session, "import options do not apply to label repair");
    }

    let report = repair_device(device)
        .with_context(|| format!("cannot repair labels on {}", device.display()))?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }

    Ok(report.exit_code())
}
