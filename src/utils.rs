use crate::errors::{ApiError, ApiResult};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use log::{debug, error, warn};
use serde_json::Value;

/// Shorten a secret for logging; never log a full token or client id.
pub fn truncate_secret(secret: &str) -> String {
    if secret.len() > 8 && secret.is_char_boundary(4) && secret.is_char_boundary(secret.len() - 4)
    {
        format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
    } else {
        "<short-secret>".to_string()
    }
}

/// Converts a serde_json::Value (string or number) to u32 with a default value
///
/// # Arguments
///
/// * `value` - Optional JSON value containing either a number or string
/// * `default` - Default value to use if conversion fails or value is None
pub fn parse_max_results(value: Option<Value>, default: u32) -> u32 {
    match value {
        Some(Value::Number(num)) => match num.as_u64() {
            Some(n) if n <= u32::MAX as u64 => n as u32,
            _ => {
                debug!("Number not convertible to u32, using default {}", default);
                default
            }
        },
        Some(Value::String(s)) => s.trim().parse::<u32>().unwrap_or_else(|_| {
            debug!("Could not parse string '{}' as u32, using default {}", s, default);
            default
        }),
        Some(other) => {
            debug!(
                "Unexpected value type: {:?}, using default {}",
                other, default
            );
            default
        }
        None => default,
    }
}

/// Parse an ISO-8601 datetime supplied as a tool argument.
///
/// Values carrying an offset keep it; naive values are taken as UTC.
pub fn parse_tool_datetime(value: &str) -> ApiResult<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    const NAIVE_FORMATS: [&str; 3] =
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    Err(ApiError::ParseError(format!(
        "Invalid datetime '{}': expected ISO format such as 2024-01-15T14:00:00",
        value
    )))
}

/// Turn a non-success response into an `HttpError`, otherwise decode JSON.
pub async fn read_json(response: reqwest::Response) -> ApiResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<no response body>".to_string());
        error!("Request failed. Status: {}, Error: {}", status, message);
        return Err(ApiError::HttpError {
            status: status.as_u16(),
            message,
        });
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value =
        serde_json::from_str(&text).map_err(|e| ApiError::ParseError(e.to_string()))?;
    debug!("Response preview: {}", preview(&text, 300));
    Ok(value)
}

/// Transient failures become a `{success: false}` report; anything else
/// propagates.
pub fn soft_failure(err: ApiError) -> ApiResult<Value> {
    if err.is_transient() {
        warn!("Request failed: {}", err);
        Ok(serde_json::json!({ "success": false, "error": err.to_string() }))
    } else {
        Err(err)
    }
}

pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// String field with a default for absent or non-string values.
pub fn str_or<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
