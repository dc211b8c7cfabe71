//! LightSpeed CLI - Command-line interface for the LightSpeed engine
//!
//! Commands:
//! - replay: Process a recorded fix log into per-fix reports (batch mode)
//! - run: Process fixes streamed on stdin (streaming mode)
//! - validate: Validate fix records
//! - doctor: Diagnose configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use lightspeed::audio::AudioCommand;
use lightspeed::schema::{FixRecord, FixRecordAdapter, FixReport, SCHEMA_VERSION};
use lightspeed::types::AudioResource;
use lightspeed::{
    FirstFixPolicy, LightspeedError, ProcessorConfig, SpeedProcessor, LIGHTSPEED_VERSION,
    PRODUCER_NAME,
};

/// LightSpeed - GPS kinematics and speed-gated audio trigger
#[derive(Parser)]
#[command(name = "lightspeed")]
#[command(version = LIGHTSPEED_VERSION)]
#[command(about = "Derive speed from GPS fixes and decide when audio plays", long_about = None)]
struct Cli {
    /// Enable debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded fix log (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        #[command(flatten)]
        trigger: TriggerArgs,
    },

    /// Process fixes streamed on stdin (streaming mode)
    Run {
        #[command(flatten)]
        trigger: TriggerArgs,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Validate fix records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration
    Doctor {
        /// Processor config file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Trigger configuration, layered over an optional config file
#[derive(Args)]
struct TriggerArgs {
    /// Processor config JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Speed threshold in km/h
    #[arg(long)]
    threshold_kmh: Option<f64>,

    /// Enable audio triggering
    #[arg(long)]
    enable_audio: bool,

    /// Audio resource to start when the threshold is exceeded
    #[arg(long)]
    audio_resource: Option<String>,

    /// How the first fix is treated
    #[arg(long)]
    first_fix: Option<FirstFixArg>,
}

#[derive(Clone, ValueEnum)]
enum FirstFixArg {
    /// Measure the first fix from (0, 0) at t=0
    FromOrigin,
    /// Use the first fix only to seed the state
    SeedOnly,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one fix per line)
    Ndjson,
    /// JSON array of fixes
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one report per line)
    Ndjson,
    /// JSON array of reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

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

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .compact()
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to init logging. {}", e);
    }
}

fn run(cli: Cli) -> Result<(), LightspeedCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            trigger,
        } => cmd_replay(&input, &output, input_format, output_format, &trigger),

        Commands::Run { trigger, flush } => cmd_run(&trigger, flush),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    trigger: &TriggerArgs,
) -> Result<(), LightspeedCliError> {
    let input_data = read_input(input)?;
    let mut processor = SpeedProcessor::with_config(resolve_config(trigger)?);
    info!(session_id = %processor.session_id(), "replaying fix log");

    // Bad fixes are dropped with a warning, as in streaming mode. Only a JSON
    // array that is not a document at all fails the whole replay.
    let mut reports: Vec<FixReport> = Vec::new();
    match input_format {
        InputFormat::Ndjson => {
            for (line_num, line) in input_data.lines().enumerate() {
                match processor.process_line(line) {
                    Ok(Some(report)) => reports.push(report),
                    Ok(None) => {}
                    Err(e) => warn!(line = line_num + 1, error = %e, "dropping fix"),
                }
                log_commands(processor.sink_mut().take_commands());
            }
        }
        InputFormat::Json => {
            let records = FixRecordAdapter::parse_array(&input_data)?;
            for (index, record) in records.iter().enumerate() {
                match processor.process_record(record) {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!(index, error = %e, "dropping fix"),
                }
                log_commands(processor.sink_mut().take_commands());
            }
        }
    }

    if reports.is_empty() {
        return Err(LightspeedCliError::NoFixes);
    }

    let output_data = format_output(&reports, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(trigger: &TriggerArgs, flush: bool) -> Result<(), LightspeedCliError> {
    let mut processor = SpeedProcessor::with_config(resolve_config(trigger)?);
    info!(session_id = %processor.session_id(), "streaming fixes from stdin");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;

        let report = match processor.process_line(&line) {
            Ok(Some(report)) => report,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_num + 1, error = %e, "dropping fix");
                continue;
            }
        };
        log_commands(processor.sink_mut().take_commands());

        writeln!(stdout, "{}", serde_json::to_string(&report)?)?;
        if flush {
            stdout.flush()?;
        }
    }

    stdout.flush()?;
    info!(fixes = processor.fixes_processed(), "input closed");
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), LightspeedCliError> {
    let input_data = read_input(input)?;
    let records = parse_records(&input_data, &input_format)?;
    let failures = FixRecordAdapter::validate_records(&records);

    let report = ValidationReport {
        total_fixes: records.len(),
        valid_fixes: records.len() - failures.len(),
        invalid_fixes: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                fix_id: f.fix_id.clone(),
                error: f.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total fixes:   {}", report.total_fixes);
        println!("Valid fixes:   {}", report.valid_fixes);
        println!("Invalid fixes: {}", report.invalid_fixes);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Fix {} (index {}): {}",
                    err.fix_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_fixes > 0 {
        Err(LightspeedCliError::ValidationFailed(report.invalid_fixes))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), LightspeedCliError> {
    let mut checks: Vec<DoctorCheck> = vec![
        DoctorCheck::new(
            "version",
            CheckStatus::Ok,
            format!("LightSpeed version {}", LIGHTSPEED_VERSION),
        ),
        DoctorCheck::new(
            "schema_version",
            CheckStatus::Ok,
            format!("Input schema: {}", SCHEMA_VERSION),
        ),
    ];

    if let Some(config_path) = config {
        checks.extend(check_config_file(config_path));
    }

    let stdin_message = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (streaming mode ready)"
    };
    checks.push(DoctorCheck::new("stdin", CheckStatus::Ok, stdin_message.to_string()));

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: LIGHTSPEED_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("LightSpeed Doctor Report");
        println!("========================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(LightspeedCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_config_file(path: &Path) -> Vec<DoctorCheck> {
    if !path.exists() {
        return vec![DoctorCheck::new(
            "config",
            CheckStatus::Warning,
            "Config file does not exist".to_string(),
        )];
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return vec![DoctorCheck::new(
                "config",
                CheckStatus::Error,
                format!("Cannot read config file: {}", e),
            )]
        }
    };

    // Parsed without validation so every problem is listed as its own check.
    let config: ProcessorConfig = match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            return vec![DoctorCheck::new(
                "config",
                CheckStatus::Error,
                format!("Invalid config JSON: {}", e),
            )]
        }
    };

    let mut checks = vec![DoctorCheck::new(
        "config",
        CheckStatus::Ok,
        format!(
            "Config valid (threshold {} km/h, grace {} ms, audio {})",
            config.trigger.threshold_kmh,
            config.trigger.grace_ms,
            if config.trigger.enabled { "enabled" } else { "disabled" }
        ),
    )];

    if !(0.0..=120.0).contains(&config.trigger.threshold_kmh) {
        checks.push(DoctorCheck::new(
            "threshold",
            CheckStatus::Warning,
            "Threshold is outside the 0-120 km/h range offered by the app".to_string(),
        ));
    }

    if config.trigger.grace_ms <= 0 {
        checks.push(DoctorCheck::new(
            "grace_period",
            CheckStatus::Error,
            "Grace period must be positive".to_string(),
        ));
    }

    if config.trigger.enabled && config.trigger.audio_resource.is_none() {
        checks.push(DoctorCheck::new(
            "audio_resource",
            CheckStatus::Warning,
            "Audio is enabled but no resource is selected; the trigger will never start"
                .to_string(),
        ));
    }

    checks
}

// Helper functions

fn read_input(input: &Path) -> Result<String, LightspeedCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_records(
    input_data: &str,
    input_format: &InputFormat,
) -> Result<Vec<FixRecord>, LightspeedCliError> {
    let records = match input_format {
        InputFormat::Ndjson => FixRecordAdapter::parse_ndjson(input_data)?,
        InputFormat::Json => FixRecordAdapter::parse_array(input_data)?,
    };
    Ok(records)
}

fn resolve_config(args: &TriggerArgs) -> Result<ProcessorConfig, LightspeedCliError> {
    let mut config = match &args.config {
        Some(path) => ProcessorConfig::from_json(&fs::read_to_string(path)?)?,
        None => ProcessorConfig::default(),
    };

    if let Some(threshold_kmh) = args.threshold_kmh {
        config.trigger.threshold_kmh = threshold_kmh;
    }
    if args.enable_audio {
        config.trigger.enabled = true;
    }
    if let Some(resource) = &args.audio_resource {
        config.trigger.audio_resource = Some(AudioResource::new(resource.clone()));
    }
    if let Some(first_fix) = &args.first_fix {
        config.first_fix = match first_fix {
            FirstFixArg::FromOrigin => FirstFixPolicy::FromOrigin,
            FirstFixArg::SeedOnly => FirstFixPolicy::SeedOnly,
        };
    }

    config.validate()?;
    debug!(?config, "resolved processor config");
    Ok(config)
}

fn log_commands(commands: Vec<AudioCommand>) {
    for command in commands {
        match command {
            AudioCommand::Start { resource } => info!(%resource, "audio start"),
            AudioCommand::Stop => info!("audio stop"),
        }
    }
}

fn format_output(
    reports: &[FixReport],
    format: &OutputFormat,
) -> Result<String, LightspeedCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::with_capacity(reports.len());
            for report in reports {
                lines.push(serde_json::to_string(report)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(reports)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(reports)?),
    }
}

// Error types

#[derive(Debug)]
enum LightspeedCliError {
    Io(io::Error),
    Engine(LightspeedError),
    Json(serde_json::Error),
    NoFixes,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for LightspeedCliError {
    fn from(e: io::Error) -> Self {
        LightspeedCliError::Io(e)
    }
}

impl From<LightspeedError> for LightspeedCliError {
    fn from(e: LightspeedError) -> Self {
        LightspeedCliError::Engine(e)
    }
}

impl From<serde_json::Error> for LightspeedCliError {
    fn from(e: serde_json::Error) -> Self {
        LightspeedCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LightspeedCliError> for CliError {
    fn from(e: LightspeedCliError) -> Self {
        match e {
            LightspeedCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LightspeedCliError::Engine(e) => CliError {
                code: e.code().to_string(),
                message: e.to_string(),
                hint: Some("Ensure input matches the lightspeed.fix.v1 schema".to_string()),
            },
            LightspeedCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            LightspeedCliError::NoFixes => CliError {
                code: "NO_FIXES".to_string(),
                message: "No fixes found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            LightspeedCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} fixes failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            LightspeedCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_fixes: usize,
    valid_fixes: usize,
    invalid_fixes: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    fix_id: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: String) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
