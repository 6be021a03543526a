//! Input sanitization for emitted events
//!
//! Values under blocked keys are replaced with [`MASK`], whatever their type.
//! Long strings are cut to [`STRING_VALUE_LIMIT`] characters followed by
//! [`TRUNCATION_MARKER`]. Maps and arrays are walked recursively.

use serde_json::Value;

use crate::config::DEFAULT_MASK_KEYS;
use crate::tools::ToolInput;

/// Replacement for masked values
pub const MASK: &str = "***REDACTED***";

/// Longest string value kept intact in sanitized input, in characters
pub const STRING_VALUE_LIMIT: usize = 500;

/// Appended to anything cut short
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Masks sensitive keys and shortens long strings
#[derive(Debug, Clone)]
pub struct Sanitizer {
    // stored lowercased
    mask_keys: Vec<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MASK_KEYS.iter().copied())
    }
}

impl Sanitizer {
    /// Create a sanitizer masking keys that contain any of `mask_keys`
    pub fn new<I, S>(mask_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            mask_keys: mask_keys
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Check if a key's value must be masked
    pub fn is_masked(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.mask_keys.iter().any(|blocked| key.contains(blocked.as_str()))
    }

    /// Sanitized copy of a tool input map
    pub fn sanitize_input(&self, input: &ToolInput) -> ToolInput {
        input
            .iter()
            .map(|(key, value)| {
                let value = if self.is_masked(key) {
                    Value::String(MASK.to_string())
                } else {
                    self.sanitize_value(value)
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Sanitized copy of an arbitrary JSON value
    pub fn sanitize_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.sanitize_input(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.sanitize_value(v)).collect()),
            Value::String(s) => match truncate_chars(s, STRING_VALUE_LIMIT) {
                Some(short) => Value::String(short),
                None => value.clone(),
            },
            other => other.clone(),
        }
    }
}

/// Cut `s` to `limit` characters plus [`TRUNCATION_MARKER`], or `None` if it fits
pub(crate) fn truncate_chars(s: &str, limit: usize) -> Option<String> {
    let (cut, _) = s.char_indices().nth(limit)?;
    let mut short = String::with_capacity(cut + TRUNCATION_MARKER.len());
    short.push_str(&s[..cut]);
    short.push_str(TRUNCATION_MARKER);
    Some(short)
}
