//! Callscope CLI - Command-line interface for Callscope
//!
//! Commands:
//! - chunk: Split a transcript into overlapping windows
//! - aggregate: Fold one call's markers into a feature record
//! - compare: Rank the features separating a success and a failure cohort
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

use callscope::chunker::{ChunkerConfig, TranscriptChunker, WordTimestamp};
use callscope::cohort::compare;
use callscope::config::{ConfigError, PipelineConfig};
use callscope::extract::CallMetrics;
use callscope::features::{AgentAggregator, DecisionAggregator, FeatureRecord};
use callscope::logging;
use callscope::schema::nlu::NluResults;
use callscope::schema::MarkerSet;
use callscope::{CALLSCOPE_VERSION, PRODUCER_NAME};

/// Callscope - behavioral analytics for call transcripts
#[derive(Parser)]
#[command(name = "callscope")]
#[command(version = CALLSCOPE_VERSION)]
#[command(about = "Chunk transcripts, aggregate markers and compare call cohorts", long_about = None)]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a transcript into overlapping windows
    Chunk {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "text")]
        input_format: TranscriptFormat,

        /// Call duration in seconds, used when words carry no timing
        #[arg(long)]
        duration: Option<f64>,

        /// Window length in seconds
        #[arg(long)]
        window_secs: Option<f64>,

        /// Overlap between windows in seconds
        #[arg(long)]
        overlap_secs: Option<f64>,
    },

    /// Fold one call's markers into a feature record
    Aggregate {
        /// Marker set JSON (`{"schema_version": ..., "markers": [...]}`, use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Call metrics JSON (`{"schema_version": ..., "metrics": {...}}`)
        #[arg(long)]
        metrics: Option<PathBuf>,

        /// NLU results JSON (v3 only)
        #[arg(long)]
        nlu: Option<PathBuf>,

        /// Call duration in seconds (v2 density and thirds)
        #[arg(long, default_value = "0")]
        duration: f64,
    },

    /// Rank the features separating a success and a failure cohort
    Compare {
        /// Feature records of successful calls (JSON array or NDJSON)
        #[arg(long)]
        success: PathBuf,

        /// Feature records of failed calls (JSON array or NDJSON)
        #[arg(long)]
        failure: PathBuf,

        /// Only print the N most significant differentiators
        #[arg(long)]
        top: Option<usize>,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum TranscriptFormat {
    /// Plain transcript text
    Text,
    /// JSON object with `text`, optional `words` and `duration_seconds`
    Json,
}

/// Transcript accepted by `chunk --input-format json`
#[derive(Deserialize)]
struct TranscriptInput {
    text: String,
    #[serde(default)]
    words: Option<Vec<WordTimestamp>>,
    #[serde(default)]
    duration_seconds: Option<f64>,
}

fn main() -> ExitCode {
    logging::init_from_env();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CallscopeCliError> {
    let pretty = cli.pretty;
    match cli.command {
        Commands::Chunk {
            input,
            input_format,
            duration,
            window_secs,
            overlap_secs,
        } => cmd_chunk(&input, input_format, duration, window_secs, overlap_secs, pretty),

        Commands::Aggregate {
            input,
            metrics,
            nlu,
            duration,
        } => cmd_aggregate(&input, metrics.as_deref(), nlu.as_deref(), duration, pretty),

        Commands::Compare {
            success,
            failure,
            top,
        } => cmd_compare(&success, &failure, top, pretty),

        Commands::Doctor { json } => cmd_doctor(json),
    }
}

fn cmd_chunk(
    input: &Path,
    input_format: TranscriptFormat,
    duration: Option<f64>,
    window_secs: Option<f64>,
    overlap_secs: Option<f64>,
    pretty: bool,
) -> Result<(), CallscopeCliError> {
    let data = read_input(input)?;
    let transcript = match input_format {
        TranscriptFormat::Text => TranscriptInput {
            text: data,
            words: None,
            duration_seconds: None,
        },
        TranscriptFormat::Json => serde_json::from_str(&data)?,
    };

    let mut config: ChunkerConfig = PipelineConfig::from_env()?.chunking;
    if let Some(window) = window_secs {
        config.window_seconds = window;
    }
    if let Some(overlap) = overlap_secs {
        config.overlap_seconds = overlap;
    }
    let chunker = TranscriptChunker::new(config)
        .map_err(|e| CallscopeCliError::InvalidArgument(e.to_string()))?;
    let chunks = chunker.chunk(
        &transcript.text,
        transcript.words.as_deref(),
        duration.or(transcript.duration_seconds),
    );
    if chunks.is_empty() {
        return Err(CallscopeCliError::EmptyTranscript);
    }

    info!(chunks = chunks.len(), "Transcript chunked");
    print_json(&chunks, pretty)
}

fn cmd_aggregate(
    input: &Path,
    metrics: Option<&Path>,
    nlu: Option<&Path>,
    duration: f64,
    pretty: bool,
) -> Result<(), CallscopeCliError> {
    let markers: MarkerSet = serde_json::from_str(&read_input(input)?)?;
    let metrics: Option<CallMetrics> = metrics
        .map(|path| -> Result<_, CallscopeCliError> { Ok(serde_json::from_str(&read_input(path)?)?) })
        .transpose()?;
    let nlu: Option<NluResults> = nlu
        .map(|path| -> Result<_, CallscopeCliError> { Ok(serde_json::from_str(&read_input(path)?)?) })
        .transpose()?;

    debug!(
        schema = %markers.schema_version(),
        markers = markers.len(),
        "Aggregating markers"
    );

    let record = match markers {
        MarkerSet::V2(markers) => {
            let metrics = match &metrics {
                Some(CallMetrics::V2(m)) => Some(m),
                Some(CallMetrics::V3(_)) => return Err(CallscopeCliError::SchemaMismatch),
                None => None,
            };
            FeatureRecord::V2(AgentAggregator::aggregate(markers, duration, metrics))
        }
        MarkerSet::V3(markers) => {
            let metrics = match &metrics {
                Some(CallMetrics::V3(m)) => Some(m),
                Some(CallMetrics::V2(_)) => return Err(CallscopeCliError::SchemaMismatch),
                None => None,
            };
            FeatureRecord::V3(DecisionAggregator::aggregate(markers, metrics, nlu.as_ref()))
        }
    };

    print_json(&record, pretty)
}

fn cmd_compare(
    success: &Path,
    failure: &Path,
    top: Option<usize>,
    pretty: bool,
) -> Result<(), CallscopeCliError> {
    let success = read_records(success)?;
    let failure = read_records(failure)?;

    let mut comparison = compare(&success, &failure);
    if comparison.is_empty() {
        return Err(CallscopeCliError::NotComparable {
            success: success.len(),
            failure: failure.len(),
        });
    }
    if let Some(n) = top {
        comparison.differentiators.truncate(n);
    }

    info!(
        success = comparison.success_count,
        failure = comparison.failure_count,
        differentiators = comparison.differentiators.len(),
        "Cohorts compared"
    );
    print_json(&comparison, pretty)
}

fn cmd_doctor(json: bool) -> Result<(), CallscopeCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "callscope_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Callscope version {}", CALLSCOPE_VERSION),
    });

    match PipelineConfig::from_env() {
        Ok(config) => checks.push(DoctorCheck {
            name: "pipeline_config".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "schema {}, window {}s, overlap {}s, delay {}ms, concurrency {}",
                config.schema_version,
                config.chunking.window_seconds,
                config.chunking.overlap_seconds,
                config.extraction_delay.as_millis(),
                config.batch_concurrency
            ),
        }),
        Err(e) => checks.push(DoctorCheck {
            name: "pipeline_config".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        }),
    }

    let log_level = std::env::var("CALLSCOPE_LOG_LEVEL").ok();
    checks.push(match log_level.as_deref() {
        Some(level) if logging::parse_level(level).is_none() => DoctorCheck {
            name: "log_level".to_string(),
            status: CheckStatus::Warning,
            message: format!("Unknown CALLSCOPE_LOG_LEVEL '{}', using info", level),
        },
        Some(level) => DoctorCheck {
            name: "log_level".to_string(),
            status: CheckStatus::Ok,
            message: format!("Log level {}", level),
        },
        None => DoctorCheck {
            name: "log_level".to_string(),
            status: CheckStatus::Ok,
            message: "Log level info (default)".to_string(),
        },
    });

    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: if atty::is(atty::Stream::Stdin) {
            "stdin is a TTY (pass files with --input)".to_string()
        } else {
            "stdin is a pipe (--input - ready)".to_string()
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: CALLSCOPE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Callscope Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    if report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(CallscopeCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn read_input(path: &Path) -> Result<String, CallscopeCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Feature records from a JSON array or NDJSON
fn read_records(path: &Path) -> Result<Vec<FeatureRecord>, CallscopeCliError> {
    let data = read_input(path)?;
    if data.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&data)?);
    }

    data.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| FeatureRecord::from_json(line).map_err(CallscopeCliError::from))
        .collect()
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), CallscopeCliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

// Error handling

#[derive(Debug)]
enum CallscopeCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Config(ConfigError),
    InvalidArgument(String),
    EmptyTranscript,
    SchemaMismatch,
    NotComparable { success: usize, failure: usize },
    DoctorFailed,
}

impl From<io::Error> for CallscopeCliError {
    fn from(e: io::Error) -> Self {
        CallscopeCliError::Io(e)
    }
}

impl From<serde_json::Error> for CallscopeCliError {
    fn from(e: serde_json::Error) -> Self {
        CallscopeCliError::Json(e)
    }
}

impl From<ConfigError> for CallscopeCliError {
    fn from(e: ConfigError) -> Self {
        CallscopeCliError::Config(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CallscopeCliError> for CliError {
    fn from(e: CallscopeCliError) -> Self {
        match e {
            CallscopeCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CallscopeCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Records need a schema_version of v2 or v3".to_string()),
            },
            CallscopeCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check CALLSCOPE_* environment variables".to_string()),
            },
            CallscopeCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: None,
            },
            CallscopeCliError::EmptyTranscript => CliError {
                code: "EMPTY_TRANSCRIPT".to_string(),
                message: "Transcript contains no words".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            CallscopeCliError::SchemaMismatch => CliError {
                code: "SCHEMA_MISMATCH".to_string(),
                message: "Metrics and markers use different schema versions".to_string(),
                hint: None,
            },
            CallscopeCliError::NotComparable { success, failure } => CliError {
                code: "NOT_COMPARABLE".to_string(),
                message: format!(
                    "Cannot compare {} success and {} failure records",
                    success, failure
                ),
                hint: Some("Both cohorts must be non-empty and share one schema version".to_string()),
            },
            CallscopeCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
