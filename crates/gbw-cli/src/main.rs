use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use gbw_core::{ConflictPolicy, Conversion, ConvertError, ModelError, REQUIRED_HEADERS};
use gbw_storage::{StorageError, read_source, write_output};
use serde::Serialize;
use serde_json::{Value, json};

mod config;
mod logging;

use config::{AppConfig, ConfigError, load_config};
use logging::{LogLevel, init_logging, log_event};

const JSON_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum CliExitCode {
    Success = 0,
    Failure = 1,
}

#[derive(Debug)]
struct CliError {
    code: CliExitCode,
    kind: &'static str,
    message: String,
}

impl CliError {
    fn failure(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            code: CliExitCode::Failure,
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
struct CommandOutput {
    message: String,
    payload: Value,
}

#[derive(Debug, Parser)]
#[command(name = "gbw")]
#[command(
    about = "Consolidates a Google Passwords CSV into a Bitwarden-compatible JSON file",
    version
)]
#[command(after_help = "Example: gbw 'Google Passwords.csv' bitwarden_import.json")]
struct Cli {
    /// Path to the Google Passwords CSV export.
    input_csv: PathBuf,
    /// Path for the Bitwarden JSON import file.
    output_json: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    json: bool,
    #[arg(long, value_enum)]
    conflict_policy: Option<ConflictPolicyArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConflictPolicyArg {
    MergeIntoNotes,
    FirstWins,
    LastWins,
}

impl ConflictPolicyArg {
    fn into_core(self) -> ConflictPolicy {
        match self {
            Self::MergeIntoNotes => ConflictPolicy::MergeIntoNotes,
            Self::FirstWins => ConflictPolicy::FirstWins,
            Self::LastWins => ConflictPolicy::LastWins,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonEnvelope {
    schema_version: u8,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonError>,
}

#[derive(Debug, Serialize)]
struct JsonError {
    code: u8,
    kind: String,
    message: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(&cli) {
        Ok(output) => {
            if cli.json {
                print_envelope(&JsonEnvelope {
                    schema_version: JSON_SCHEMA_VERSION,
                    ok: true,
                    result: Some(output.payload),
                    error: None,
                });
            } else {
                println!("{}", output.message);
            }
            ExitCode::from(CliExitCode::Success as u8)
        }
        Err(error) => {
            log_event(
                LogLevel::Error,
                "convert_failed",
                json!({ "kind": error.kind }),
            );
            if cli.json {
                print_envelope(&JsonEnvelope {
                    schema_version: JSON_SCHEMA_VERSION,
                    ok: false,
                    result: None,
                    error: Some(JsonError {
                        code: error.code as u8,
                        kind: error.kind.to_owned(),
                        message: error.message.clone(),
                    }),
                });
            } else {
                eprintln!("\n[ERROR] {}", error.message);
            }
            ExitCode::from(error.code as u8)
        }
    }
}

fn print_envelope(envelope: &JsonEnvelope) {
    match serde_json::to_string(envelope) {
        Ok(line) => println!("{line}"),
        Err(error) => eprintln!("[ERROR] failed to encode JSON output: {error}"),
    }
}

fn execute(cli: &Cli) -> Result<CommandOutput, CliError> {
    let config = load_config(cli.config.as_deref()).map_err(map_config_error)?;
    init_logging(&config.logging);
    let policy = resolve_conflict_policy(cli, &config);

    if !cli.json {
        println!(
            "Reading Google Passwords CSV from: {}",
            cli.input_csv.display()
        );
    }
    log_event(
        LogLevel::Info,
        "convert_started",
        json!({ "conflict_policy": policy }),
    );

    let raw = read_source(&cli.input_csv).map_err(map_storage_error)?;
    let Conversion { document, report } =
        gbw_core::convert_reader(raw.as_slice(), policy).map_err(map_convert_error)?;

    let mut warnings = Vec::new();
    for conflict in &report.conflicts {
        log_event(
            LogLevel::Warn,
            "credential_conflict",
            json!({ "name": conflict.name, "url": conflict.url }),
        );
        let warning = conflict_warning(&conflict.name, &conflict.url, policy);
        if !cli.json {
            eprintln!("  [WARNING] {warning}");
        }
        warnings.push(warning);
    }
    log_event(
        LogLevel::Debug,
        "rows_accepted",
        json!({ "accepted_rows": report.accepted_rows }),
    );

    let bytes = document.to_json_pretty().map_err(map_model_error)?;
    write_output(&cli.output_json, &bytes).map_err(map_storage_error)?;

    let items = document.item_count();
    log_event(
        LogLevel::Info,
        "convert_finished",
        json!({
            "items": items,
            "accepted_rows": report.accepted_rows,
            "conflicts": report.conflicts.len()
        }),
    );

    Ok(CommandOutput {
        message: format!(
            "\n----------------------------------------------------\n\
             Success! Your Bitwarden import file is ready.\n   \
             - Processed {items} unique login items.\n   \
             - File created at: {}\n\
             ----------------------------------------------------\n",
            cli.output_json.display()
        ),
        payload: json!({
            "input": cli.input_csv,
            "output": cli.output_json,
            "items": items,
            "accepted_rows": report.accepted_rows,
            "conflict_policy": policy,
            "conflicts": report.conflicts,
            "warnings": warnings
        }),
    })
}

fn resolve_conflict_policy(cli: &Cli, config: &AppConfig) -> ConflictPolicy {
    cli.conflict_policy
        .map(ConflictPolicyArg::into_core)
        .unwrap_or(config.conversion.conflict_policy)
}

fn conflict_warning(name: &str, url: &str, policy: ConflictPolicy) -> String {
    let outcome = match policy {
        ConflictPolicy::MergeIntoNotes | ConflictPolicy::FirstWins => {
            "sticking with the first credentials found for this name"
        }
        ConflictPolicy::LastWins => "replacing earlier credentials for this name",
    };
    format!(
        "conflicting credentials found for `{name}`: URL `{url}` has a different username/password; {outcome}"
    )
}

fn map_config_error(error: ConfigError) -> CliError {
    match error {
        ConfigError::Io { path, error } => CliError::failure(
            "config_read_failed",
            format!("failed to read {}: {error}", path.display()),
        ),
        ConfigError::Parse { path, error } => CliError::failure(
            "config_parse_failed",
            format!("failed to parse {}: {error}", path.display()),
        ),
    }
}

fn map_convert_error(error: ConvertError) -> CliError {
    match error {
        ConvertError::Schema { missing, found } => CliError::failure(
            "schema_error",
            format!(
                "The CSV file does not have the correct Google Passwords format.\n\
                 --> Expected headers to include: {REQUIRED_HEADERS:?}\n\
                 --> Missing headers: {missing:?}\n\
                 --> Found headers: {found:?}"
            ),
        ),
        ConvertError::Csv(error) => CliError::failure(
            "unexpected_error",
            format!("An unexpected error occurred: {error}"),
        ),
    }
}

fn map_storage_error(error: StorageError) -> CliError {
    match &error {
        StorageError::SourceUnavailable { path, .. }
            if error.io_kind() == std::io::ErrorKind::NotFound =>
        {
            CliError::failure(
                "source_unavailable",
                format!(
                    "The file '{}' was not found. Please check the path.",
                    path.display()
                ),
            )
        }
        StorageError::SourceUnavailable { .. } => {
            CliError::failure("source_unavailable", error.to_string())
        }
        StorageError::SinkWrite { .. } => CliError::failure(
            "sink_write_failed",
            format!("Could not write the output file: {error}"),
        ),
    }
}

fn map_model_error(error: ModelError) -> CliError {
    CliError::failure(
        "unexpected_error",
        format!("An unexpected error occurred: {error}"),
    )
}
