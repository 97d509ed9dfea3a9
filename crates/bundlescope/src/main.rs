//! bundlescope command-line interface

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    thread,
};

use anyhow::{Context, Result, anyhow};
use bundlescope::{
    AnalysisSession, CompilationSnapshot, IngestSummary, NormalizedConfig, RawUserConfig,
    normalize_user_config,
};
use clap::{ArgAction, Parser, Subcommand};
use log::{LevelFilter, error, info};

#[derive(Debug, Parser)]
#[command(name = "bundlescope", version, about = "Build analysis for JavaScript bundlers")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the normalized form of a user configuration
    Normalize {
        /// JSON or TOML configuration file; defaults apply when omitted
        config: Option<PathBuf>,
    },
    /// Ingest compilation snapshots and print the build report
    Ingest {
        /// JSON or TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Snapshot files, one per compiler; ingested concurrently
        #[arg(required = true)]
        snapshots: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG still overrides the flag
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Normalize { config } => {
            let config = load_config(config.as_deref())?;
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize normalized configuration")?;
            emit(&json, None)
        }
        Command::Ingest {
            config,
            output,
            snapshots,
        } => {
            let config = load_config(config.as_deref())?;
            let json = ingest_all(config, &snapshots)?;
            emit(&json, output.as_deref())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<NormalizedConfig> {
    let raw = match path {
        Some(path) => RawUserConfig::from_path(path)?,
        None => RawUserConfig::default(),
    };
    normalize_user_config(&raw).context("Invalid configuration")
}

/// Ingest every snapshot on its own thread, then finalize the session into a
/// JSON report
fn ingest_all(config: NormalizedConfig, paths: &[PathBuf]) -> Result<String> {
    let session = AnalysisSession::new(config);

    thread::scope(|scope| -> Result<()> {
        let session = &session;
        let workers: Vec<_> = paths
            .iter()
            .map(|path| scope.spawn(move || ingest_file(session, path)))
            .collect();

        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow!("Snapshot worker panicked"))??;
        }
        Ok(())
    })?;

    let report = session.finalize()?;
    report
        .to_json_pretty()
        .context("Failed to serialize build report")
}

fn ingest_file(session: &AnalysisSession, path: &Path) -> Result<IngestSummary> {
    let snapshot = CompilationSnapshot::from_path(path)?;
    let summary = session
        .ingest(&snapshot)
        .with_context(|| format!("Failed to ingest {}", path.display()))?;
    info!(
        "{}: {} modules added, {} merged",
        path.display(),
        summary.modules_added,
        summary.modules_merged
    );
    Ok(summary)
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        return fs::write(path, text)
            .with_context(|| format!("Failed to write report to {}", path.display()));
    }

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}").context("Failed to write to stdout")
}
