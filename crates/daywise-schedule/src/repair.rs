//! Repair of model output into a strict `Schedule`.
//!
//! Model output carries no schema guarantee. Everything that reaches the
//! store or the calendar passes through [`repair_schedule`] first. The
//! function is pure: the same input always yields the same result.

use serde_json::Value;
use thiserror::Error;

use crate::types::{Schedule, ScheduleEntry};

const QUOTE_CHARS: [char; 3] = ['"', '\'', '`'];
const FENCE: &str = "```";

/// Keys checked, in order, when the model wraps the list in an object.
const LIST_KEYS: [&str; 2] = ["tasks", "schedule"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("model output is not valid JSON: {diagnostic}")]
    InvalidJson { raw: String, diagnostic: String },

    #[error("model output does not contain a schedule list (found {found})")]
    UnexpectedShape { raw: String, found: String },

    #[error("schedule entry {index} is invalid: {reason}")]
    InvalidEntry {
        raw: String,
        index: usize,
        reason: String,
    },
}

impl RepairError {
    /// The model output exactly as received.
    pub fn raw(&self) -> &str {
        match self {
            Self::InvalidJson { raw, .. }
            | Self::UnexpectedShape { raw, .. }
            | Self::InvalidEntry { raw, .. } => raw,
        }
    }
}

/// Turn text claimed to be a JSON schedule into a validated [`Schedule`].
///
/// Wrapping code fences and quote characters are removed, then the text is
/// parsed strictly. Only if that fails are single quotes swapped for double
/// quotes, so text that is already valid JSON is never rewritten.
pub fn repair_schedule(raw: &str) -> Result<Schedule, RepairError> {
    let unwrapped = unwrap_text(raw);

    let value = match serde_json::from_str::<Value>(&unwrapped) {
        Ok(value) => value,
        Err(strict_err) => {
            let requoted = unwrapped.replace('\'', "\"");
            serde_json::from_str::<Value>(&requoted).map_err(|e| {
                tracing::debug!(strict = %strict_err, requoted = %e, "Model output failed to parse");
                RepairError::InvalidJson {
                    raw: raw.to_string(),
                    diagnostic: e.to_string(),
                }
            })?
        }
    };

    let items = locate_list(&value).ok_or_else(|| RepairError::UnexpectedShape {
        raw: raw.to_string(),
        found: describe(&value),
    })?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            to_entry(item).map_err(|reason| RepairError::InvalidEntry {
                raw: raw.to_string(),
                index,
                reason,
            })
        })
        .collect()
}

/// Strip code fences and matching outer quotes until neither is left.
fn unwrap_text(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    loop {
        let before = text.len();

        if let Some(rest) = text.strip_prefix(FENCE) {
            // Drop an info string such as `json` right after the fence.
            let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            let rest = rest.strip_suffix(FENCE).unwrap_or(rest);
            text = rest.trim().to_string();
        } else if text.len() >= 2 {
            if let Some(first) = text.chars().next().filter(|c| QUOTE_CHARS.contains(c)) {
                if text.ends_with(first) {
                    text = decode_wrapped(&text, first);
                }
            }
        }

        if text.len() == before {
            return text;
        }
    }
}

/// Remove one pair of wrapping quotes. A double-quoted JSON string literal is
/// decoded so escaped inner quotes survive.
fn decode_wrapped(text: &str, quote: char) -> String {
    if quote == '"' {
        if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(text) {
            return inner.trim().to_string();
        }
    }
    let q = quote.len_utf8();
    text[q..text.len() - q].trim().to_string()
}

fn locate_list(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            for key in LIST_KEYS {
                if let Some(Value::Array(items)) = map.get(key) {
                    return Some(items);
                }
            }
            let mut arrays = map.values().filter_map(Value::as_array);
            match (arrays.next(), arrays.next()) {
                (Some(only), None) => Some(only),
                _ => None,
            }
        }
        _ => None,
    }
}

fn to_entry(item: &Value) -> Result<ScheduleEntry, String> {
    let obj = item
        .as_object()
        .ok_or_else(|| format!("expected an object, found {}", describe(item)))?;

    let field = |key: &str| -> Result<String, String> {
        match obj.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(format!("`{}` must be a string, found {}", key, describe(other))),
            None => Err(format!("missing `{}`", key)),
        }
    };

    Ok(ScheduleEntry::new(field("name")?, field("time")?))
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "an array".to_string(),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("an object with keys [{}]", keys.join(", "))
        }
    }
}
