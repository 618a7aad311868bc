//! CHORDS `url_create` request construction.

use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use crate::config::{SubmissionConfig, TIMESTAMP_KEY};
use crate::delivery::DeliveryError;
use crate::mapper::VariableRecord;

const URL_CREATE_PATH: &str = "measurements/url_create";

/// Instrument identity plus one record's variables.
#[derive(Debug, Clone, Copy)]
pub struct OutboundRecord<'a> {
    pub instrument_id: &'a str,
    pub api_email: &'a str,
    pub api_key: &'a str,
    pub vars: &'a VariableRecord,
}

impl<'a> OutboundRecord<'a> {
    pub fn new(config: &'a SubmissionConfig, vars: &'a VariableRecord) -> Self {
        Self {
            instrument_id: &config.instrument_id,
            api_email: &config.api_email,
            api_key: &config.api_key,
            vars,
        }
    }
}

/// Builds the GET URI that submits `record` to the CHORDS portal at `host`.
/// `host` may carry its own scheme; plain host names get `http://`.
pub fn build_record_uri(host: &str, record: &OutboundRecord<'_>) -> Result<String, DeliveryError> {
    let host = host.trim().trim_end_matches('/');
    let base = if host.contains("://") {
        format!("{host}/{URL_CREATE_PATH}")
    } else {
        format!("http://{host}/{URL_CREATE_PATH}")
    };
    let mut url = Url::parse(&base).map_err(|source| DeliveryError::InvalidHost {
        host: host.to_string(),
        source,
    })?;

    let at = format_instant(record.vars.at())?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("instrument_id", record.instrument_id);
        for (short_name, value) in record.vars.vars() {
            query.append_pair(short_name, &value.to_string());
        }
        query.append_pair(TIMESTAMP_KEY, &at);
        if !record.api_email.is_empty() {
            query.append_pair("email", record.api_email);
        }
        if !record.api_key.is_empty() {
            query.append_pair("api_key", record.api_key);
        }
    }

    Ok(url.into())
}

/// Masks the `api_key` parameter so the URI can be logged.
pub fn redact_api_key(uri: &str) -> String {
    let Ok(mut url) = Url::parse(uri) else {
        return uri.to_string();
    };
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == "api_key" {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.into()
}

fn format_instant(epoch_seconds: f64) -> Result<String, DeliveryError> {
    if !epoch_seconds.is_finite() {
        return Err(DeliveryError::InvalidTimestamp(epoch_seconds));
    }
    let micros = (epoch_seconds * 1e6).round() as i64;
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or(DeliveryError::InvalidTimestamp(epoch_seconds))
}
