//! LearnLens CLI - Command-line interface for the LearnLens analytics engine
//!
//! Commands:
//! - factor: Run factor analysis over learner logs
//! - cluster: Cluster learners by factor scores
//! - analyze: Run the full pipeline and emit a report
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use learnlens::{
    AnalyticsConfig, AnalyticsError, AnalyticsProcessor, LEARNLENS_VERSION, PRODUCER_NAME,
};

/// LearnLens - Latent learning-style factors and learner groups from interaction logs
#[derive(Parser)]
#[command(name = "learnlens")]
#[command(version = LEARNLENS_VERSION)]
#[command(about = "Factor analysis and clustering of learner interaction logs", long_about = None)]
struct Cli {
    /// Configuration file (JSON); flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run factor analysis over learner logs
    Factor {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,
    },

    /// Cluster learners by factor scores (learner -> { axis: number })
    Cluster {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Number of clusters
        #[arg(short, long)]
        k: usize,

        /// Cap on assignment passes
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Random seed for reproducible clusters
        #[arg(long)]
        seed: Option<u64>,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,
    },

    /// Run factor analysis and optional clustering, emitting a report
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Number of clusters (omit to skip clustering)
        #[arg(short, long)]
        k: Option<usize>,

        /// Random seed for reproducible clusters
        #[arg(long)]
        seed: Option<u64>,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LensCliError> {
    match cli.command {
        Commands::Factor {
            input,
            output,
            output_format,
        } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_factor(&input, &output, config, &output_format)
        }

        Commands::Cluster {
            input,
            output,
            k,
            max_iterations,
            seed,
            output_format,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(max_iterations) = max_iterations {
                config.kmeans_max_iterations = max_iterations;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            config.validate()?;
            cmd_cluster(&input, &output, k, config, &output_format)
        }

        Commands::Analyze {
            input,
            output,
            k,
            seed,
            output_format,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if seed.is_some() {
                config.seed = seed;
            }
            cmd_analyze(&input, &output, k, config, &output_format)
        }

        Commands::Doctor { json } => cmd_doctor(cli.config.as_deref(), json),
    }
}

fn cmd_factor(
    input: &Path,
    output: &Path,
    config: AnalyticsConfig,
    output_format: &OutputFormat,
) -> Result<(), LensCliError> {
    let input_data = read_input(input)?;
    let processor = AnalyticsProcessor::with_config(config);

    let result = processor.factor_analysis_json(&input_data)?;
    info!(
        "{} factors over {} learners",
        result.num_factors,
        result.factor_scores.len()
    );

    write_output(output, &format_output(&result, output_format)?)
}

fn cmd_cluster(
    input: &Path,
    output: &Path,
    k: usize,
    config: AnalyticsConfig,
    output_format: &OutputFormat,
) -> Result<(), LensCliError> {
    let input_data = read_input(input)?;
    let mut processor = AnalyticsProcessor::with_config(config);

    let result = processor.cluster_json(&input_data, k)?;
    info!("{} clusters after {} iterations", result.k, result.iterations);

    write_output(output, &format_output(&result, output_format)?)
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    k: Option<usize>,
    config: AnalyticsConfig,
    output_format: &OutputFormat,
) -> Result<(), LensCliError> {
    let input_data = read_input(input)?;
    let mut processor = AnalyticsProcessor::with_config(config);

    let report = processor.analyze(&input_data, k)?;
    if report.learner_count == 0 {
        return Err(LensCliError::NoLearners);
    }

    write_output(output, &format_output(&report, output_format)?)
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), LensCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "learnlens_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("LearnLens version {}", LEARNLENS_VERSION),
    });

    // Check config file if provided
    match config_path {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist".to_string(),
        }),
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => match AnalyticsConfig::from_json(&content) {
                Ok(config) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (kaiser threshold {}, {} seed)",
                        config.kaiser_threshold,
                        if config.seed.is_some() { "fixed" } else { "random" }
                    ),
                }),
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid config: {}", e),
                }),
            },
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using default configuration".to_string(),
        }),
    }

    // Check stdin is available (for `-i -`)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready for `-i -`)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: LEARNLENS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("LearnLens Doctor Report");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(LensCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<AnalyticsConfig, LensCliError> {
    match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            Ok(AnalyticsConfig::from_json(&fs::read_to_string(path)?)?)
        }
        None => Ok(AnalyticsConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, LensCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), LensCliError> {
    if output.to_string_lossy() == "-" {
        println!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_output<T: Serialize>(value: &T, format: &OutputFormat) -> Result<String, LensCliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(value)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(value)?),
    }
}

// Error types

#[derive(Debug)]
enum LensCliError {
    Io(io::Error),
    Analytics(AnalyticsError),
    Json(serde_json::Error),
    NoLearners,
    DoctorFailed,
}

impl From<io::Error> for LensCliError {
    fn from(e: io::Error) -> Self {
        LensCliError::Io(e)
    }
}

impl From<AnalyticsError> for LensCliError {
    fn from(e: AnalyticsError) -> Self {
        LensCliError::Analytics(e)
    }
}

impl From<serde_json::Error> for LensCliError {
    fn from(e: serde_json::Error) -> Self {
        LensCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LensCliError> for CliError {
    fn from(e: LensCliError) -> Self {
        match e {
            LensCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LensCliError::Analytics(e) => {
                let (code, hint) = match &e {
                    AnalyticsError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    AnalyticsError::InvalidFeatureMap(_)
                    | AnalyticsError::EmptyFeatures
                    | AnalyticsError::NoFactorAxes => (
                        "INVALID_FEATURES",
                        "Input must map learner ids to objects with F1, F2, ... scores",
                    ),
                    AnalyticsError::InvalidClusterCount { .. } => {
                        ("INVALID_K", "Choose k between 1 and the number of learners")
                    }
                    AnalyticsError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Run 'learnlens doctor --config <file>' for details")
                    }
                    AnalyticsError::EncodingError(_) => ("ENCODING_ERROR", "Report a bug"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            LensCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            LensCliError::NoLearners => CliError {
                code: "NO_LEARNERS".to_string(),
                message: "No learner records found in input".to_string(),
                hint: Some(
                    "Provide a JSON array of log records or an object with a `logs` array"
                        .to_string(),
                ),
            },
            LensCliError::DoctorFailed => CliError {
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
