//! xp-core - prompt experiment engine CLI
//!
//! Reads telemetry and experiment state from the data directory, prints
//! results on stdout (JSON by default), logs on stderr.

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use xp_common::{DocumentId, Error, ExperimentId, OutputFormat, Result, SCHEMA_VERSION};
use xp_config::{engine_schema_json, resolve_config, validate_engine, EngineConfig};
use xp_core::compare::DEFAULT_CONFIDENCE;
use xp_core::experiment::{
    DEFAULT_MAX_COST_INCREASE_PCT, DEFAULT_MAX_DURATION_DAYS, DEFAULT_MIN_SUCCESS_RATE_DELTA,
    DEFAULT_TARGET_SAMPLE_SIZE,
};
use xp_core::{
    logging, render, Engine, ExitCode, ExperimentStatus, NewExperiment, TrafficAllocation,
};
use xp_telemetry::{CompletedExtraction, TelemetryRecord, TimeWindow};

#[derive(Parser, Debug)]
#[command(name = "xp-core", version, about = "Prompt version experiment engine")]
struct Cli {
    /// Engine config file (overrides XP_CONFIG and XDG discovery)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Data directory for telemetry and experiment files
    #[arg(long, global = true, value_name = "DIR", env = "XP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate metrics for one prompt version
    Metrics {
        /// Prompt version, e.g. v1.0.0
        version: String,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Compare a treatment version against a control
    Compare {
        control: String,
        treatment: String,

        /// Confidence level in [0.5, 0.99]
        #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
        confidence: f64,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Manage experiments
    #[command(subcommand)]
    Experiment(ExperimentCommands),

    /// Telemetry ingestion
    #[command(subcommand)]
    Telemetry(TelemetryCommands),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug, Clone, Default)]
struct WindowArgs {
    /// Trailing window in days ending now
    #[arg(long, conflicts_with_all = ["from", "to"])]
    days: Option<u32>,

    /// Window start (RFC 3339)
    #[arg(long, requires = "to")]
    from: Option<DateTime<Utc>>,

    /// Window end (RFC 3339)
    #[arg(long, requires = "from")]
    to: Option<DateTime<Utc>>,
}

impl WindowArgs {
    fn window(&self) -> Result<Option<TimeWindow>> {
        match (self.days, self.from, self.to) {
            (Some(0), _, _) => Err(Error::Validation("--days must be at least 1".into())),
            (Some(days), _, _) => TimeWindow::trailing_days(Utc::now(), days).map(Some),
            (None, Some(from), Some(to)) => TimeWindow::new(from, to).map(Some),
            _ => Ok(None),
        }
    }
}

#[derive(Subcommand, Debug)]
enum ExperimentCommands {
    /// Create a draft experiment
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        control: String,

        #[arg(long)]
        treatment: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Traffic split: 50/50, 80/20, 20/80, or 95/5
        #[arg(long, default_value = "50/50")]
        traffic: TrafficAllocation,

        /// Requests per arm before the experiment is considered done
        #[arg(long, default_value_t = DEFAULT_TARGET_SAMPLE_SIZE)]
        target_sample_size: u64,

        #[arg(long, default_value_t = DEFAULT_MAX_DURATION_DAYS)]
        max_duration_days: u32,

        /// Success-rate improvement (pp) the treatment must exceed
        #[arg(long, default_value_t = DEFAULT_MIN_SUCCESS_RATE_DELTA)]
        min_success_rate_delta: f64,

        /// Largest acceptable cost increase (%)
        #[arg(long, default_value_t = DEFAULT_MAX_COST_INCREASE_PCT)]
        max_cost_increase_pct: f64,

        #[arg(long, default_value = "system")]
        created_by: String,
    },

    /// draft → running
    Start { id: String },

    /// Count one request against the arm serving `version`
    Record { id: String, version: String },

    /// running → completed
    Complete {
        id: String,

        #[arg(long)]
        winner: String,

        #[arg(long)]
        conclusion: Option<String>,
    },

    /// completed → promoted
    Promote { id: String },

    /// completed → rolled_back
    Rollback {
        id: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Show one experiment
    Get { id: String },

    /// Compare the experiment's versions over its run
    Evaluate {
        id: String,

        #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
        confidence: f64,
    },

    /// List experiments, newest first
    List {
        #[arg(long)]
        status: Option<ExperimentStatus>,

        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum TelemetryCommands {
    /// Append one record from flags, or JSONL records from a file or stdin
    Append(AppendArgs),
}

#[derive(Args, Debug)]
struct AppendArgs {
    /// JSONL input file; stdin when neither this nor --version is given
    #[arg(long, value_name = "PATH", conflicts_with = "prompt_version")]
    file: Option<PathBuf>,

    /// Prompt version of a single record
    #[arg(long = "version", id = "prompt_version", value_name = "VERSION")]
    prompt_version: Option<String>,

    #[arg(long, value_enum, default_value_t = StatusArg::Completed, requires = "prompt_version")]
    status: StatusArg,

    #[arg(long, default_value_t = 0, requires = "prompt_version")]
    latency_ms: u64,

    #[arg(long, default_value_t = 0, requires = "prompt_version")]
    input_tokens: u64,

    #[arg(long, default_value_t = 0, requires = "prompt_version")]
    output_tokens: u64,

    /// Populated schema fields
    #[arg(long, default_value_t = 0, requires = "prompt_version")]
    fields: u32,

    /// Failure message for --status failed
    #[arg(long, requires = "prompt_version")]
    error: Option<String>,

    /// Generated when omitted
    #[arg(long, requires = "prompt_version")]
    document_id: Option<String>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum StatusArg {
    Completed,
    Failed,
}

impl AppendArgs {
    /// The single record described by flags, if a version was given.
    fn record(&self) -> Option<TelemetryRecord> {
        let version = self.prompt_version.as_ref()?;
        let document_id = self
            .document_id
            .as_deref()
            .map(DocumentId::from)
            .unwrap_or_default();
        let now = Utc::now();
        Some(match self.status {
            StatusArg::Completed => TelemetryRecord::completed(
                document_id,
                version,
                now,
                CompletedExtraction {
                    processing_time_ms: self.latency_ms,
                    input_tokens: self.input_tokens,
                    output_tokens: self.output_tokens,
                    extracted_field_count: self.fields,
                },
            ),
            StatusArg::Failed => {
                TelemetryRecord::failed(document_id, version, now, self.error.clone())
            }
        })
    }
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved config and where it came from
    Show,

    /// Validate a config file (or the resolved one)
    Validate { path: Option<PathBuf> },

    /// Print the JSON schema for engine.json
    Schema,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.log_json);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err, cli.format);
            ExitCode::from_error(&err)
        }
    };
    std::process::exit(code.as_i32());
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Config(cmd) => return run_config(cli, cmd),
        Commands::Metrics { version, window } => {
            let engine = open_engine(cli)?;
            let metrics = engine.metrics().get_version_metrics(version, window.window()?)?;
            emit(cli.format, &metrics, render::metrics)?;
        }
        Commands::Compare {
            control,
            treatment,
            confidence,
            window,
        } => {
            let engine = open_engine(cli)?;
            let result = engine.comparator().compare_in(
                control,
                treatment,
                *confidence,
                window.window()?,
            )?;
            emit(cli.format, &result, render::comparison)?;
        }
        Commands::Experiment(cmd) => run_experiment(&open_engine(cli)?, cmd, cli.format)?,
        Commands::Telemetry(TelemetryCommands::Append(args)) => {
            let engine = open_engine(cli)?;
            let appended = match args.record() {
                Some(record) => {
                    engine.record_telemetry(&record)?;
                    1
                }
                None => append_telemetry(&engine, args.file.as_deref())?,
            };
            emit(cli.format, &json!({ "appended": appended }), |_| {
                format!("appended {appended} records\n")
            })?;
        }
    }
    Ok(ExitCode::Clean)
}

fn open_engine(cli: &Cli) -> Result<Engine> {
    let resolved = resolve_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
    debug!(
        data_dir = %resolved.paths.data_dir.display(),
        using_defaults = resolved.paths.using_defaults,
        "resolved config"
    );
    Ok(Engine::open(&resolved))
}

fn run_experiment(engine: &Engine, cmd: &ExperimentCommands, format: OutputFormat) -> Result<()> {
    let manager = engine.experiments();
    let experiment = match cmd {
        ExperimentCommands::Create {
            name,
            control,
            treatment,
            description,
            traffic,
            target_sample_size,
            max_duration_days,
            min_success_rate_delta,
            max_cost_increase_pct,
            created_by,
        } => {
            let mut params = NewExperiment::new(name, control, treatment)
                .with_description(description)
                .with_traffic_allocation(*traffic)
                .with_target_sample_size(*target_sample_size)
                .with_created_by(created_by);
            params.max_duration_days = *max_duration_days;
            params.min_success_rate_delta = *min_success_rate_delta;
            params.max_cost_increase_pct = *max_cost_increase_pct;
            manager.create(params)?
        }
        ExperimentCommands::Start { id } => manager.start(&parse_id(id)?)?,
        ExperimentCommands::Record { id, version } => {
            manager.record_request(&parse_id(id)?, version)?
        }
        ExperimentCommands::Complete {
            id,
            winner,
            conclusion,
        } => manager.complete(&parse_id(id)?, winner, conclusion.clone())?,
        ExperimentCommands::Promote { id } => manager.promote(&parse_id(id)?)?,
        ExperimentCommands::Rollback { id, reason } => {
            manager.rollback(&parse_id(id)?, reason.clone())?
        }
        ExperimentCommands::Get { id } => manager.get(&parse_id(id)?)?,
        ExperimentCommands::Evaluate { id, confidence } => {
            let evaluation = engine.evaluate_experiment(&parse_id(id)?, *confidence)?;
            return emit(format, &evaluation, render::evaluation);
        }
        ExperimentCommands::List { status, limit } => {
            let experiments = manager.list(*status, *limit)?;
            return emit(format, &experiments, |list| render::experiment_list(list));
        }
    };
    emit(format, &experiment, render::experiment)
}

fn run_config(cli: &Cli, cmd: &ConfigCommands) -> Result<ExitCode> {
    match cmd {
        ConfigCommands::Show => {
            let resolved = resolve_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
            let body = json!({
                "schema_version": SCHEMA_VERSION,
                "paths": resolved.paths,
                "config": resolved.config,
            });
            emit(cli.format, &body, |v| {
                serde_json::to_string_pretty(v).unwrap_or_default() + "\n"
            })?;
            Ok(ExitCode::Clean)
        }
        ConfigCommands::Validate { path } => {
            let config = match path.as_deref().or(cli.config.as_deref()) {
                Some(path) => parse_config_file(path)?,
                None => resolve_config(None, cli.data_dir.as_deref())?.config,
            };
            let result = validate_engine(&config);
            let valid = result.is_valid();
            let body = json!({
                "valid": valid,
                "errors": result.errors,
                "warnings": result.warnings,
            });
            emit(cli.format, &body, |_| {
                let mut text = if valid { "valid\n" } else { "invalid\n" }.to_string();
                for e in result.errors.iter().chain(&result.warnings) {
                    text.push_str(&format!("  {e}\n"));
                }
                text
            })?;
            Ok(if valid {
                ExitCode::Clean
            } else {
                ExitCode::ConfigError
            })
        }
        ConfigCommands::Schema => {
            println!("{}", engine_schema_json()?);
            Ok(ExitCode::Clean)
        }
    }
}

/// Parse without semantic validation so `config validate` can report it.
fn parse_config_file(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid JSON in {}: {}", path.display(), e)))
}

fn append_telemetry(engine: &Engine, file: Option<&Path>) -> Result<u64> {
    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(fs::File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut appended = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TelemetryRecord = serde_json::from_str(&line)
            .map_err(|e| Error::Validation(format!("line {}: {}", idx + 1, e)))?;
        engine.record_telemetry(&record)?;
        appended += 1;
    }
    info!(appended, "appended telemetry");
    Ok(appended)
}

fn parse_id(raw: &str) -> Result<ExperimentId> {
    ExperimentId::parse(raw)
        .ok_or_else(|| Error::Validation(format!("not an experiment id: {raw}")))
}

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    summary: impl FnOnce(&T) -> String,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Summary => print!("{}", summary(value)),
    }
    Ok(())
}

fn report_error(err: &Error, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let body = json!({
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                    "retryable": err.is_retryable(),
                }
            });
            eprintln!("{body}");
        }
        OutputFormat::Summary => eprintln!("xp-core: {err}"),
    }
}
