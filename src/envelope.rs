//! Unwrapping of the `{"<category>": {"result": ..., "error": ...}}` wrapper
//! yahoo! finance puts around most responses.
//!
//! Each endpoint nests its payload at a fixed depth. The depth is declared
//! once per operation as an [`Envelope`] value instead of being re-derived by
//! indexing at every call site.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use super::YahooError;

/// Error object reported inside an envelope.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct YErrorMessage {
    pub code: Option<String>,
    pub description: Option<String>,
}

impl YErrorMessage {
    /// Keep whatever the server sent. Objects that do not fit the usual
    /// `code`/`description` pair are carried as raw JSON in `description`.
    pub(crate) fn from_value(value: Value) -> YErrorMessage {
        match value {
            Value::String(code) => YErrorMessage {
                code: Some(code),
                description: None,
            },
            Value::Object(_) => match serde_json::from_value(value.clone()) {
                Ok(msg) => msg,
                Err(_) => YErrorMessage {
                    code: None,
                    description: Some(value.to_string()),
                },
            },
            other => YErrorMessage {
                code: None,
                description: Some(other.to_string()),
            },
        }
    }
}

impl fmt::Display for YErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.description) {
            (Some(code), Some(description)) => write!(f, "{code}: {description}"),
            (Some(code), None) => f.write_str(code),
            (None, Some(description)) => f.write_str(description),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

/// Where the payload sits inside a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Envelope {
    /// `body[key].result[0]`
    FirstResult(&'static str),
    /// `body[key].result`
    Results(&'static str),
    /// The body itself.
    Direct,
    /// Plain key path without a result/error pair.
    Path(&'static [&'static str]),
}

impl Envelope {
    pub(crate) fn unwrap(self, mut body: Value) -> Result<Value, YahooError> {
        match self {
            Envelope::Direct => Ok(body),
            Envelope::Results(key) => take_result(&mut body, key),
            Envelope::FirstResult(key) => match take_result(&mut body, key)? {
                Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
                _ => Err(YahooError::MissingKey(format!("{key}.result[0]"))),
            },
            Envelope::Path(keys) => {
                let mut current = body;
                for (depth, key) in keys.iter().enumerate() {
                    current = take_key(current, key)
                        .map_err(|_| YahooError::MissingKey(keys[..=depth].join(".")))?;
                }
                Ok(current)
            }
        }
    }
}

/// Move `key` out of a JSON object.
pub(crate) fn take_key(mut value: Value, key: &str) -> Result<Value, YahooError> {
    match value.get_mut(key) {
        Some(inner) => Ok(inner.take()),
        None => Err(YahooError::MissingKey(key.to_string())),
    }
}

fn take_result(body: &mut Value, key: &str) -> Result<Value, YahooError> {
    let category = body
        .get_mut(key)
        .ok_or_else(|| YahooError::MissingKey(key.to_string()))?;

    if let Some(error) = category.get_mut("error") {
        if is_error(error) {
            let msg = YErrorMessage::from_value(error.take());
            log::warn!("{key} response carries an error: {msg}");
            return Err(YahooError::ApiError(msg));
        }
    }

    match category.get_mut("result") {
        Some(result) if !result.is_null() => Ok(result.take()),
        _ => Err(YahooError::MissingKey(format!("{key}.result"))),
    }
}

fn is_error(error: &Value) -> bool {
    match error {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}
