//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;

use storage_sufficiency::core::config::Config;
use storage_sufficiency::core::errors::Result as SsmResult;
use storage_sufficiency::core::units::format_bytes;
use storage_sufficiency::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use storage_sufficiency::logger::jsonl::JsonlConfig;
use storage_sufficiency::monitor::artifact::Artifact;
use storage_sufficiency::monitor::epoch::EpochClock;
use storage_sufficiency::monitor::evaluator::{EvaluationOutcome, SufficiencyEvaluator};
use storage_sufficiency::monitor::free_space::{FreeSpaceProbe, PlatformFreeSpaceProbe, StorageMode};
use storage_sufficiency::monitor::status::{StatusPublisher, StorageStatus};
use storage_sufficiency::monitor::storage_check::StorageMonitor;
use storage_sufficiency::monitor::sufficiency::{FreeSpaceSufficiency, SufficiencyCheck};
use storage_sufficiency::platform::pal::detect_platform;

/// Storage sufficiency monitor: will this model fit on disk?
#[derive(Debug, Parser)]
#[command(
    name = "ssm",
    author,
    version,
    about = "Storage Sufficiency Monitor - checks whether a model download fits on disk",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Evaluate once and report whether the artifact fits.
    Check(CheckArgs),
    /// Keep monitoring and print every reading and status change.
    Watch(WatchArgs),
    /// Print the effective configuration.
    Config,
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("artifact").required(true).args(["size", "model"])))]
struct ArtifactArgs {
    /// Required size in bytes (e.g. 2000000000 for 2 GB).
    #[arg(long, value_name = "BYTES")]
    size: Option<u64>,
    /// JSON artifact description (`id`, `size`, `isDownloaded`, `isLocal`, `origin`).
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,
    /// Path on the volume to check (defaults to `monitor.storage_path`).
    #[arg(long, value_name = "PATH")]
    path: Option<PathBuf>,
    /// Free-space figure: `important` or `include_reserved`.
    #[arg(long, value_name = "MODE")]
    mode: Option<StorageMode>,
}

#[derive(Debug, Clone, Args)]
struct CheckArgs {
    #[command(flatten)]
    artifact: ArtifactArgs,
}

#[derive(Debug, Clone, Args)]
struct WatchArgs {
    #[command(flatten)]
    artifact: ArtifactArgs,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// The check completed and the artifact does not fit (or could not be checked).
    #[error("storage not ok: {0}")]
    NotOk(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::NotOk(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<storage_sufficiency::core::errors::SsmError> for CliError {
    fn from(error: storage_sufficiency::core::errors::SsmError) -> Self {
        use storage_sufficiency::core::errors::SsmError;
        match error {
            SsmError::InvalidConfig { .. }
            | SsmError::MissingConfig { .. }
            | SsmError::ConfigParse { .. }
            | SsmError::InvalidArtifact { .. } => Self::User(error.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Check(args) => run_check(cli, args),
        Command::Watch(args) => run_watch(cli, args),
        Command::Config => run_config(cli),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

/// Everything a check or watch needs, resolved from config plus flags.
struct Target {
    config: Config,
    artifact: Artifact,
    probe: Arc<dyn FreeSpaceProbe>,
    check: Arc<dyn SufficiencyCheck>,
}

fn resolve_target(cli: &Cli, args: &ArtifactArgs) -> Result<Target, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = &args.path {
        config.monitor.storage_path.clone_from(path);
    }
    if let Some(mode) = args.mode {
        config.monitor.storage_mode = mode;
    }

    let artifact = match (&args.model, args.size) {
        (Some(file), _) => {
            let raw = std::fs::read_to_string(file).map_err(|error| {
                CliError::User(format!("cannot read model file {}: {error}", file.display()))
            })?;
            serde_json::from_str::<Artifact>(&raw).map_err(|error| {
                CliError::User(format!("invalid model file {}: {error}", file.display()))
            })?
        }
        (None, Some(size)) => Artifact::new("cli", size),
        (None, None) => return Err(CliError::User("either --size or --model is required".into())),
    };

    let platform = detect_platform()?;
    let probe: Arc<dyn FreeSpaceProbe> = Arc::new(PlatformFreeSpaceProbe::new(
        platform,
        config.monitor.storage_path.clone(),
    ));
    let check: Arc<dyn SufficiencyCheck> = Arc::new(FreeSpaceSufficiency::new(
        Arc::clone(&probe),
        config.monitor.storage_mode,
        config.sufficiency.safety_margin_bytes,
    ));
    Ok(Target {
        config,
        artifact,
        probe,
        check,
    })
}

fn build_runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| CliError::Runtime(format!("failed to start async runtime: {error}")))
}

/// Free-space probe that keeps its last successful reading.
struct RecordingProbe {
    inner: Arc<dyn FreeSpaceProbe>,
    last: Mutex<Option<u64>>,
}

impl RecordingProbe {
    fn new(inner: Arc<dyn FreeSpaceProbe>) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }

    fn last(&self) -> Option<u64> {
        *self.last.lock()
    }
}

#[async_trait]
impl FreeSpaceProbe for RecordingProbe {
    async fn query_free_disk_storage(&self, mode: StorageMode) -> SsmResult<u64> {
        let free = self.inner.query_free_disk_storage(mode).await?;
        *self.last.lock() = Some(free);
        Ok(free)
    }
}

struct CheckReport {
    skipped: bool,
    status: StorageStatus,
    free: Option<u64>,
}

/// One evaluation. `free` is the reading the status message was built from;
/// only when the evaluation took none is a separate sample taken for display.
async fn check_once(target: &Target) -> CheckReport {
    let mode = target.config.monitor.storage_mode;
    let probe = Arc::new(RecordingProbe::new(Arc::clone(&target.probe)));
    let publisher = StatusPublisher::new();
    let evaluator = SufficiencyEvaluator::new(
        Arc::clone(&target.check),
        probe.clone(),
        mode,
        target.config.monitor.evaluate_interval(),
        &publisher,
        ActivityLoggerHandle::disabled(),
    );

    let clock = EpochClock::new();
    let outcome = evaluator.evaluate_once(&target.artifact, &clock.advance()).await;
    let free = match probe.last() {
        Some(free) => Some(free),
        None => probe.query_free_disk_storage(mode).await.ok(),
    };
    CheckReport {
        skipped: outcome == EvaluationOutcome::Skipped,
        status: publisher.storage_status(),
        free,
    }
}

fn run_check(cli: &Cli, args: &CheckArgs) -> Result<(), CliError> {
    let target = resolve_target(cli, &args.artifact)?;
    let CheckReport {
        skipped,
        status,
        free,
    } = build_runtime()?.block_on(check_once(&target));
    match output_mode(cli) {
        OutputMode::Human => {
            if skipped {
                println!(
                    "{} {} is already on the device; nothing to check",
                    "SKIP".cyan().bold(),
                    target.artifact.id
                );
            } else {
                print_status_human(&target.artifact, &status);
            }
            if let Some(free) = free {
                println!(
                    "  {} free at {} ({})",
                    format_bytes(free),
                    target.config.monitor.storage_path.display(),
                    target.config.monitor.storage_mode
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "artifact": target.artifact.id,
                "size": target.artifact.size,
                "path": target.config.monitor.storage_path,
                "mode": target.config.monitor.storage_mode,
                "freeDiskStorage": free,
                "skipped": skipped,
                "isOk": status.is_ok(),
                "message": status.message(),
            });
            write_json_line(&payload)?;
        }
    }

    if status.is_ok() {
        Ok(())
    } else {
        Err(CliError::NotOk(status.message().to_string()))
    }
}

fn run_watch(cli: &Cli, args: &WatchArgs) -> Result<(), CliError> {
    let Target {
        config,
        artifact,
        probe,
        check,
    } = resolve_target(cli, &args.artifact)?;
    let mode = output_mode(cli);

    let (logger, logger_thread) = spawn_logger(ActivityLoggerConfig {
        jsonl_config: JsonlConfig {
            path: config.paths.jsonl_log.clone(),
            fallback_path: config.paths.jsonl_fallback.clone(),
            ..JsonlConfig::default()
        },
        ..ActivityLoggerConfig::default()
    })?;
    logger.send(ActivityEvent::ConfigLoaded {
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_hash: config.stable_hash()?,
    });

    let runtime = build_runtime()?;
    let result = runtime.block_on(async {
        let monitor = StorageMonitor::new(&config.monitor, probe, check, logger.clone());
        monitor.set_artifact(artifact.clone());
        let mut readings = monitor.subscribe_free_disk_storage();
        let mut statuses = monitor.subscribe_status();
        monitor.start()?;

        if mode == OutputMode::Human {
            print_status_human(&artifact, &statuses.borrow_and_update());
        }

        let deadline = async {
            match args.duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);

        loop {
            tokio::select! {
                _ = &mut interrupted => break,
                () = &mut deadline => break,
                changed = readings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let reading = *readings.borrow_and_update();
                    if let Some(bytes) = reading {
                        match mode {
                            OutputMode::Human => println!("  {} free", format_bytes(bytes)),
                            OutputMode::Json => write_json_line(&json!({
                                "event": "free_disk_storage",
                                "bytes": bytes,
                            }))?,
                        }
                    }
                }
                changed = statuses.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = statuses.borrow_and_update().clone();
                    match mode {
                        OutputMode::Human => print_status_human(&artifact, &status),
                        OutputMode::Json => write_json_line(&json!({
                            "event": "status",
                            "isOk": status.is_ok(),
                            "message": status.message(),
                        }))?,
                    }
                }
            }
        }

        monitor.stop();
        Ok::<(), CliError>(())
    });

    logger.shutdown();
    if logger_thread.join().is_err() {
        eprintln!("[SSM-JSONL] logger thread panicked");
    }
    result
}

fn run_config(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let hash = config.stable_hash()?;
    match output_mode(cli) {
        OutputMode::Human => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|error| CliError::Runtime(format!("failed to render config: {error}")))?;
            println!("# source: {}", config.paths.config_file.display());
            println!("# hash: {hash}");
            print!("{rendered}");
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "source": config.paths.config_file,
                "hash": hash,
                "config": config,
            }))?;
        }
    }
    Ok(())
}

fn print_status_human(artifact: &Artifact, status: &StorageStatus) {
    if status.is_ok() {
        println!(
            "{} {} ({}) fits",
            "OK".green().bold(),
            artifact.id,
            format_bytes(artifact.size)
        );
    } else {
        println!("{} {}", "LOW".red().bold(), status.message());
    }
}

fn write_json_line(value: &serde_json::Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SSM_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
