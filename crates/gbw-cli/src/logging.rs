use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use directories::ProjectDirs;
use gbw_core::APP_NAME;
use serde_json::{Map, Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::config::LoggingConfig;

static LOG_CONTEXT: OnceLock<LogContext> = OnceLock::new();

/// Credential columns of the export and the notes built from them.
const CREDENTIAL_FIELDS: [&str; 4] = ["username", "password", "note", "notes"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(Self::Off),
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone)]
struct LogContext {
    level: LogLevel,
    correlation_id: String,
    log_path: PathBuf,
    max_bytes: u64,
}

/// Nothing is opened or created unless the config sets a level other than
/// `off`. An unknown level counts as `off`.
pub fn init_logging(config: &LoggingConfig) {
    if LOG_CONTEXT.get().is_some() {
        return;
    }

    let level = LogLevel::parse(&config.level).unwrap_or(LogLevel::Off);
    if level == LogLevel::Off {
        return;
    }

    let Some(log_path) = config.file.clone().or_else(state_log_path) else {
        return;
    };
    if let Some(parent) = log_path.parent()
        && !parent.as_os_str().is_empty()
        && std::fs::create_dir_all(parent).is_err()
    {
        return;
    }

    let context = LogContext {
        level,
        correlation_id: Uuid::new_v4().to_string(),
        log_path,
        max_bytes: config.max_bytes,
    };
    let _ = rotate_when_full(&context.log_path, context.max_bytes);
    let _ = LOG_CONTEXT.set(context);
}

fn state_log_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", APP_NAME)?;
    let state_dir = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
    Some(state_dir.join("gbw.log"))
}

pub fn log_event(level: LogLevel, event: &str, fields: Value) {
    let Some(context) = LOG_CONTEXT.get() else {
        return;
    };
    if level > context.level {
        return;
    }

    let Some(line) = render_line(level, event, &context.correlation_id, fields) else {
        return;
    };

    let _ = rotate_when_full(&context.log_path, context.max_bytes);
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&context.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "{line}");
}

fn render_line(
    level: LogLevel,
    event: &str,
    correlation_id: &str,
    fields: Value,
) -> Option<String> {
    let ts = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string());

    let mut object = Map::new();
    object.insert("ts".to_owned(), json!(ts));
    object.insert("level".to_owned(), json!(level.as_str()));
    object.insert("msg".to_owned(), json!(event));
    object.insert("correlation_id".to_owned(), json!(correlation_id));
    object.insert("module".to_owned(), json!("convert"));

    if let Value::Object(extra) = fields {
        object.extend(redact_credentials(extra));
    }

    serde_json::to_string(&Value::Object(object)).ok()
}

/// Event fields are flat (`name`, `url`, counts, policy). Any credential
/// column that slips in is replaced by a marker.
fn redact_credentials(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| {
            if CREDENTIAL_FIELDS.contains(&key.as_str()) {
                (key, json!("[REDACTED]"))
            } else {
                (key, value)
            }
        })
        .collect()
}

/// Keeps a single previous generation next to the log as `<file>.1`.
fn rotate_when_full(path: &Path, max_bytes: u64) -> Result<(), std::io::Error> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.len() >= max_bytes => {}
        Ok(_) => return Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error),
    }

    let mut rotated: OsString = path.as_os_str().to_owned();
    rotated.push(".1");
    std::fs::rename(path, rotated)
}
