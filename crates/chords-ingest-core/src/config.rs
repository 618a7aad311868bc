use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

/// One month of one-record-per-minute throughput.
pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 31 * 24 * 60;
pub const DEFAULT_TIMEZONE: &str = "US/Pacific";
pub const DEFAULT_RETRY_SECS: f64 = 5.0;

/// Short name reserved for the record timestamp.
pub const TIMESTAMP_KEY: &str = "at";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariableSpec {
    pub column_name: String,
    pub short_name: String,
}

impl VariableSpec {
    pub fn new(column_name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            short_name: short_name.into(),
        }
    }
}

/// Ordered column → short-name pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct VariableMapping {
    pairs: Vec<VariableSpec>,
}

impl VariableMapping {
    pub fn new(pairs: Vec<VariableSpec>) -> Self {
        Self { pairs }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableSpec> {
        self.pairs.iter()
    }

    pub fn contains_short_name(&self, short_name: &str) -> bool {
        self.pairs.iter().any(|spec| spec.short_name == short_name)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for spec in &self.pairs {
            if spec.short_name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "variable for column '{}' has an empty short_name",
                    spec.column_name
                )));
            }
            if spec.short_name == TIMESTAMP_KEY {
                return Err(ConfigError::Invalid(format!(
                    "short_name '{TIMESTAMP_KEY}' is reserved for the record timestamp"
                )));
            }
        }
        Ok(())
    }
}

impl<C, S> FromIterator<(C, S)> for VariableMapping
where
    C: Into<String>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (C, S)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(column, short)| VariableSpec::new(column, short))
                .collect(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstrumentIdRepr {
    Number(u64),
    Text(String),
}

impl From<InstrumentIdRepr> for String {
    fn from(value: InstrumentIdRepr) -> Self {
        match value {
            InstrumentIdRepr::Number(id) => id.to_string(),
            InstrumentIdRepr::Text(id) => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    instrument_id: InstrumentIdRepr,
    #[serde(default)]
    api_email: String,
    #[serde(default)]
    api_key: String,
    chords_host: String,
    time_column_name: String,
    #[serde(default = "default_delimiter")]
    delimiter: String,
    sleep_secs: f64,
    variables: VariableMapping,
    max_queue_length: Option<usize>,
    timezone: Option<String>,
    retry_secs: Option<f64>,
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Everything a run needs, loaded once and read-only afterwards.
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    pub instrument_id: String,
    pub api_email: String,
    pub api_key: String,
    pub chords_host: String,
    pub time_column_name: String,
    pub delimiter: u8,
    pub sleep: Duration,
    pub variables: VariableMapping,
    pub max_queue_length: usize,
    pub timezone: Tz,
    pub retry_delay: Duration,
    pub test_mode: bool,
}

impl SubmissionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(text)?;
        Self::try_from(file)
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Replaces the credentials read from the config file with the given
    /// values when present.
    pub fn with_credentials(mut self, api_email: Option<String>, api_key: Option<String>) -> Self {
        if let Some(email) = api_email {
            self.api_email = email;
        }
        if let Some(key) = api_key {
            self.api_key = key;
        }
        self
    }
}

impl TryFrom<ConfigFile> for SubmissionConfig {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let delimiter = parse_delimiter(&file.delimiter)?;

        let sleep = Duration::try_from_secs_f64(file.sleep_secs).map_err(|err| {
            ConfigError::Invalid(format!("sleep_secs {}: {err}", file.sleep_secs))
        })?;

        let retry_secs = file.retry_secs.unwrap_or(DEFAULT_RETRY_SECS);
        let retry_delay = Duration::try_from_secs_f64(retry_secs)
            .map_err(|err| ConfigError::Invalid(format!("retry_secs {retry_secs}: {err}")))?;

        let max_queue_length = file.max_queue_length.unwrap_or(DEFAULT_MAX_QUEUE_LENGTH);
        if max_queue_length == 0 {
            return Err(ConfigError::Invalid(
                "max_queue_length must be greater than zero".into(),
            ));
        }

        let timezone_name = file.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("timezone '{timezone_name}': {err}")))?;

        if file.time_column_name.is_empty() {
            return Err(ConfigError::Invalid("time_column_name is empty".into()));
        }
        if file.chords_host.trim().is_empty() {
            return Err(ConfigError::Invalid("chords_host is empty".into()));
        }

        file.variables.validate()?;

        Ok(Self {
            instrument_id: file.instrument_id.into(),
            api_email: file.api_email,
            api_key: file.api_key,
            chords_host: file.chords_host,
            time_column_name: file.time_column_name,
            delimiter,
            sleep,
            variables: file.variables,
            max_queue_length,
            timezone,
            retry_delay,
            test_mode: false,
        })
    }
}

fn parse_delimiter(value: &str) -> Result<u8, ConfigError> {
    let value = if value == "\\t" { "\t" } else { value };
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(ConfigError::Invalid(format!(
            "delimiter must be a single ASCII character, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "instrument_id": 12,
        "api_email": "logger@example.org",
        "api_key": "secret",
        "chords_host": "chords.example.org",
        "time_column_name": "Time",
        "delimiter": ";",
        "sleep_secs": 0.5,
        "variables": [
            {"column_name": "Temp", "short_name": "temp"},
            {"column_name": "Hum", "short_name": "hum"}
        ]
    }"#;

    #[test]
    fn parses_required_fields_and_defaults() {
        let config = SubmissionConfig::from_json_str(SAMPLE).expect("config");

        assert_eq!(config.instrument_id, "12");
        assert_eq!(config.delimiter, b';');
        assert_eq!(config.sleep, Duration::from_millis(500));
        assert_eq!(config.max_queue_length, 44_640);
        assert_eq!(config.timezone, chrono_tz::US::Pacific);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.variables.len(), 2);
        assert!(config.variables.contains_short_name("hum"));
        assert!(!config.test_mode);
    }

    #[test]
    fn string_instrument_ids_are_accepted() {
        let text = SAMPLE.replace("\"instrument_id\": 12", "\"instrument_id\": \"7a\"");
        let config = SubmissionConfig::from_json_str(&text).expect("config");
        assert_eq!(config.instrument_id, "7a");
    }

    #[test]
    fn reserved_short_name_is_rejected() {
        let text = SAMPLE.replace("\"short_name\": \"hum\"", "\"short_name\": \"at\"");
        let err = SubmissionConfig::from_json_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn multi_character_delimiter_is_rejected() {
        let text = SAMPLE.replace("\"delimiter\": \";\"", "\"delimiter\": \";;\"");
        assert!(SubmissionConfig::from_json_str(&text).is_err());
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let text = SAMPLE.replace(
            "\"sleep_secs\": 0.5",
            "\"sleep_secs\": 0.5, \"timezone\": \"Mars/Olympus\"",
        );
        assert!(SubmissionConfig::from_json_str(&text).is_err());
    }

    #[test]
    fn credentials_can_be_overridden() {
        let config = SubmissionConfig::from_json_str(SAMPLE)
            .expect("config")
            .with_credentials(None, Some("rotated".into()));
        assert_eq!(config.api_email, "logger@example.org");
        assert_eq!(config.api_key, "rotated");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SubmissionConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.json"));
    }
}
