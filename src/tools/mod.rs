//! Tool bodies, one module per provider.
//!
//! Each function returns the JSON document for its tool. Errors are turned
//! into `{"error": ...}` by [`respond`], so nothing fails across the tool
//! boundary.

pub mod calendar;
pub mod drive;
pub mod gmail;
pub mod notion;

use crate::errors::ApiResult;
use log::error;
use serde_json::{json, Value};

/// Render a tool result, mapping any error to `{"error": message}`.
pub fn respond(tool: &str, result: ApiResult<Value>) -> String {
    let value = match result {
        Ok(value) => value,
        Err(e) => {
            error!("Tool {} failed: {}", tool, e);
            json!({ "error": e.to_string() })
        }
    };
    format!("{:#}", value)
}

/// Clamp a u32 argument into a u8 score.
pub(crate) fn as_score(value: u32) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}
