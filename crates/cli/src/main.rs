//! acv: validate, lint, repair, bundle and run conversion rules.

mod commands;
mod config;
mod error;

use std::path::PathBuf;
use std::process;

use acv_core::SchemaVersion;
use acv_interchange::Format;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::error::CliError;

/// Output format for errors that stop a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Rule-driven payload conversion between JSON, XML and query strings.
#[derive(Parser)]
#[command(
    name = "acv",
    version,
    about = "Rule-driven payload conversion between JSON, XML and query strings"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "ACV_CONFIG", default_value = "acv.toml")]
    config: PathBuf,

    /// Format of error messages on stderr (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    error_format: OutputFormat,

    /// Suppress error messages on stderr
    #[arg(long, global = true)]
    quiet: bool,

    /// Log more (-v info, -vv debug); overrides RUST_LOG
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check, repair and package rules documents
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Convert one payload with a rules document
    Convert {
        /// Path to the rules document
        #[arg(long)]
        rules: PathBuf,
        /// Input payload; its extension (.json, .xml, .txt) picks the codec
        #[arg(long)]
        input: PathBuf,
        /// Where to write the converted payload
        #[arg(long)]
        output: PathBuf,
        /// Pretty-print JSON and XML output
        #[arg(long)]
        pretty: bool,
    },

    /// Time a rules document over newline-delimited JSON samples
    Benchmark {
        /// Path to the rules document
        #[arg(long)]
        rules: PathBuf,
        /// NDJSON file, one sample input per line
        #[arg(long)]
        input: PathBuf,
        /// Number of executions (defaults to the config, then 100)
        #[arg(long)]
        iterations: Option<usize>,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Compile a rules document and report its errors
    Validate {
        /// Path to the rules document
        file: PathBuf,
    },

    /// Report errors and advisory warnings
    Lint {
        /// Path to the rules document
        file: PathBuf,
    },

    /// Propose and optionally apply safe repairs
    Doctor {
        /// Path to the rules document
        #[arg(long)]
        rules: PathBuf,
        /// Sample input used to find runtime failures
        #[arg(long)]
        input: Option<PathBuf>,
        /// Format of the sample (json, xml or query)
        #[arg(long)]
        format: Option<Format>,
        /// Apply the proposed repairs
        #[arg(long)]
        apply_safe_fixes: bool,
        /// Write the repaired document here
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check whether a document can run on an older or newer schema version
    Compatibility {
        /// Path to the rules document
        #[arg(long)]
        rules: PathBuf,
        /// Schema version to check against, e.g. 1.1
        #[arg(long)]
        target: SchemaVersion,
    },

    /// Inline includes and fragments into one self-contained document
    Bundle {
        /// Path to the entry rules document
        #[arg(long)]
        rules: PathBuf,
        /// Where to write the bundled document
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e.to_string(), cli.error_format, cli.quiet);
            process::exit(1);
        }
    };

    let outcome = match cli.command {
        Commands::Rules { command } => match command {
            RulesCommand::Validate { file } => commands::rules::cmd_validate(&file),
            RulesCommand::Lint { file } => commands::rules::cmd_lint(&file),
            RulesCommand::Doctor {
                rules,
                input,
                format,
                apply_safe_fixes,
                out,
            } => commands::rules::cmd_doctor(
                &commands::rules::DoctorArgs {
                    rules,
                    input,
                    format,
                    apply_safe_fixes,
                    out,
                },
                &config,
            ),
            RulesCommand::Compatibility { rules, target } => {
                commands::rules::cmd_compatibility(&rules, target)
            }
            RulesCommand::Bundle { rules, out } => commands::rules::cmd_bundle(&rules, &out),
        },
        Commands::Convert {
            rules,
            input,
            output,
            pretty,
        } => commands::convert::cmd_convert(&rules, &input, &output, pretty, &config),
        Commands::Benchmark {
            rules,
            input,
            iterations,
        } => commands::benchmark::cmd_benchmark(&rules, &input, iterations, &config),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            report_error(&e.to_string(), cli.error_format, cli.quiet);
            process::exit(1);
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}

/// Print a report on stdout.
pub(crate) fn print_report(report: &serde_json::Value) {
    println!("{:#}", report);
}

pub(crate) fn read_file(path: &std::path::Path) -> Result<String, CliError> {
    tracing::debug!(path = %path.display(), "reading");
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_file(path: &std::path::Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "wrote");
    Ok(())
}
