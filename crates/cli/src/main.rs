//! `aurum` — config-driven entity resolution and golden-record runner.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use aurum_resolve::engine::{run_with, RunOptions};
use aurum_resolve::{load_csv_records, EntityRecord, ResolveConfig};

const EXIT_INVALID_CONFIG: u8 = 2;
const EXIT_RUNTIME: u8 = 3;
const EXIT_REVIEW: u8 = 4;

struct CliError {
    code: u8,
    message: String,
}

fn cli_err(code: u8, message: impl Into<String>) -> CliError {
    CliError { code, message: message.into() }
}

#[derive(Parser)]
#[command(name = "aurum", version, about = "Entity resolution and golden-record engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a resolution from a TOML config file
    #[command(after_help = "\
Examples:
  aurum run customers.resolve.toml
  aurum run customers.resolve.toml --json
  aurum run customers.resolve.toml --output result.json --workers 4")]
    Run {
        /// Path to the .resolve.toml config file
        config: PathBuf,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file (overrides [output].json in the config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Worker threads for pairwise scoring (0 = all cores)
        #[arg(long, default_value_t = 0)]
        workers: usize,
    },

    /// Validate a config without running
    #[command(after_help = "\
Examples:
  aurum validate customers.resolve.toml")]
    Validate {
        /// Path to the .resolve.toml config file
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { config, json, output, workers } => cmd_run(config, json, output, workers),
        Commands::Validate { config } => cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            ExitCode::from(err.code)
        }
    }
}

fn load_config(config_path: &Path) -> Result<ResolveConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| cli_err(EXIT_RUNTIME, format!("cannot read config: {e}")))?;
    ResolveConfig::from_toml(&config_str).map_err(|e| cli_err(EXIT_INVALID_CONFIG, e.to_string()))
}

fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    workers: usize,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    // Source files resolve relative to the config file's directory.
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let mut records: Vec<EntityRecord> = Vec::new();
    let mut source_names: Vec<&String> = config.sources.keys().collect();
    source_names.sort();
    for name in source_names {
        let source = &config.sources[name];
        let csv_path = base_dir.join(&source.file);
        let csv_data = std::fs::read_to_string(&csv_path)
            .map_err(|e| cli_err(EXIT_RUNTIME, format!("cannot read {}: {e}", csv_path.display())))?;
        let rows = load_csv_records(name, &csv_data, source, config.entity_type)
            .map_err(|e| cli_err(EXIT_RUNTIME, e.to_string()))?;
        records.extend(rows);
    }

    let options = RunOptions { workers, ..RunOptions::default() };
    let outcome = run_with(&config, &records, &options)
        .map_err(|e| cli_err(EXIT_RUNTIME, e.to_string()))?;

    let json_str = serde_json::to_string_pretty(&outcome)
        .map_err(|e| cli_err(EXIT_RUNTIME, format!("JSON serialization error: {e}")))?;

    let output_file = output_file.or_else(|| config.output.json.as_ref().map(PathBuf::from));
    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| cli_err(EXIT_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &outcome.summary;
    eprintln!(
        "'{}': {} records ({} skipped) → {} golden records — {} matches, {} possible, {} conflicts, {} warnings",
        outcome.meta.config_name,
        s.input_records,
        s.skipped_records,
        s.golden_records,
        s.matches,
        s.possible_matches,
        s.conflicts,
        outcome.warnings.len(),
    );

    if s.possible_matches > 0 || s.manual_review_fields > 0 {
        return Err(cli_err(
            EXIT_REVIEW,
            format!(
                "{} possible matches and {} fields queued for manual review",
                s.possible_matches, s.manual_review_fields
            ),
        ));
    }

    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    eprintln!(
        "valid: '{}' ({}) with {} field(s), {} blocking key(s), {} source(s)",
        config.name,
        config.entity_type,
        config.fields.len(),
        config.blocking.keys.len(),
        config.sources.len(),
    );
    Ok(())
}
