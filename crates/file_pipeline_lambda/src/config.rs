use thiserror::Error;

pub const METADATA_TABLE_NAME_VAR: &str = "METADATA_TABLE_NAME";
pub const RESULT_QUEUE_URL_VAR: &str = "RESULT_QUEUE_URL";
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Flattened JSON lines for CloudWatch.
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{name} has unsupported value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings read once per cold start.
///
/// `result_queue_url` is optional so a function wired only to the gateway can
/// start without it; the processor reports the gap per invocation instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub metadata_table: String,
    pub result_queue_url: Option<String>,
    pub log_format: LogFormat,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let metadata_table =
            read(METADATA_TABLE_NAME_VAR).ok_or(ConfigError::Missing(METADATA_TABLE_NAME_VAR))?;
        let result_queue_url = read(RESULT_QUEUE_URL_VAR);
        let log_format = match read(LOG_FORMAT_VAR).as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_VAR,
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            metadata_table,
            result_queue_url,
            log_format,
        })
    }
}
