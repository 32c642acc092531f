use crate::errors::{ApiError, ApiResult};
use crate::models::EmailInsight;
use crate::session::Session;
use crate::utils::read_json;
use crate::views::importance_score;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

pub struct GmailClient {
    session: Arc<Session>,
    base_url: String,
}

impl GmailClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            base_url: crate::config::GMAIL_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Full message resources matching a Gmail search query.
    pub async fn get_messages(&self, query: &str, max_results: u32) -> ApiResult<Vec<Value>> {
        debug!(
            "Listing messages with query='{}', max_results={}",
            query, max_results
        );
        let url = format!("{}/users/me/messages", self.base_url);
        let max = max_results.to_string();
        let response = self
            .session
            .request(Method::GET, &url)
            .await?
            .query(&[("q", query), ("maxResults", max.as_str())])
            .send()
            .await?;
        let listing = read_json(response).await?;

        let ids: Vec<&str> = listing
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        debug!("Found {} messages, fetching details", ids.len());

        let mut detailed = Vec::with_capacity(ids.len());
        for id in ids {
            let url = format!("{}/users/me/messages/{}", self.base_url, urlencoding::encode(id));
            let response = self.session.request(Method::GET, &url).await?.send().await?;
            detailed.push(read_json(response).await?);
        }
        Ok(detailed)
    }

    /// Normalized messages for a query. A failed remote call yields an empty
    /// list; a malformed message is an error.
    pub async fn fetch_insights(
        &self,
        query: &str,
        max_results: u32,
    ) -> ApiResult<Vec<EmailInsight>> {
        let messages = match self.get_messages(query, max_results).await {
            Ok(messages) => messages,
            Err(e) if e.is_transient() => {
                warn!("Gmail request for '{}' failed, returning no messages: {}", query, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        messages.iter().map(parse_message).collect()
    }
}

fn header<'a>(headers: &'a [Value], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|h| h.get("value").and_then(Value::as_str))
}

/// Normalize a Gmail message resource.
pub fn parse_message(message: &Value) -> ApiResult<EmailInsight> {
    let payload = message
        .get("payload")
        .filter(|p| p.is_object())
        .ok_or_else(|| ApiError::MalformedResponse("message has no payload".to_string()))?;
    let headers = payload
        .get("headers")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let subject = header(headers, "Subject").unwrap_or("No Subject").to_string();
    let sender = header(headers, "From").unwrap_or("Unknown Sender").to_string();
    let date = header(headers, "Date")
        .and_then(parse_email_date)
        .unwrap_or_else(|| Utc::now().naive_utc());

    let snippet = message
        .get("snippet")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let labels: Vec<String> = message
        .get("labelIds")
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let is_unread = labels.iter().any(|l| l == "UNREAD");
    let importance_score = importance_score(&subject, &sender, &labels);

    Ok(EmailInsight {
        subject,
        sender,
        date,
        snippet,
        importance_score,
        labels,
        is_unread,
    })
}

// Headers with no zone at all, read as UTC
const NAIVE_DATE_FORMATS: [&str; 4] = [
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M",
    "%d %b %Y %H:%M",
];

/// Parse an RFC 2822 `Date` header into naive UTC.
///
/// Trailing comments such as `(UTC)` or `(PST)` are ignored, as are zone
/// names following a numeric offset (`+0000 GMT`). A header without any zone
/// is taken to be UTC.
pub fn parse_email_date(value: &str) -> Option<NaiveDateTime> {
    let mut value = value.trim();
    if value.ends_with(')') {
        if let Some(open) = value.rfind('(') {
            value = value[..open].trim_end();
        }
    }
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.naive_utc());
    }

    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    while tokens.len() > 1
        && tokens
            .last()
            .map_or(false, |t| t.chars().all(|c| c.is_ascii_alphabetic()))
    {
        tokens.pop();
    }
    let stripped = tokens.join(" ");
    if stripped != value {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&stripped) {
            return Some(dt.naive_utc());
        }
    }

    let parsed = NAIVE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&stripped, format).ok());
    if parsed.is_none() {
        debug!("Unparseable Date header '{}'", value);
    }
    parsed
}
