//! Payload redaction for callers without sensitive-data rights.
//!
//! Two rules apply at every depth: values under a sensitive key are replaced
//! whole, and string or integer values shaped like a card number, a social
//! security number, or an email address are masked wherever they appear.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Value substituted for every masked field.
pub const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

/// Payload keys whose values are masked, compared after normalization.
pub const SENSITIVE_PAYLOAD_FIELDS: &[&str] = &[
    "password",
    "password_hash",
    "secret",
    "client_secret",
    "token",
    "access_token",
    "refresh_token",
    "id_token",
    "api_key",
    "authorization",
    "cookie",
    "session_id",
    "private_key",
    "request_body",
    "raw_request",
    "card_number",
    "cvv",
    "ssn",
];

static SSN_VALUE: LazyLock<Regex> =
    LazyLock::new(|| literal_pattern(r"^(?:[0-9]{3}-[0-9]{2}-[0-9]{4}|[0-9]{9})$"));
static CARD_NUMBER_VALUE: LazyLock<Regex> =
    LazyLock::new(|| literal_pattern(r"^[0-9](?:[ -]?[0-9]){12,18}$"));
static EMAIL_VALUE: LazyLock<Regex> =
    LazyLock::new(|| literal_pattern(r"^([^@\s]+)(@[^@\s]+\.[^@\s]+)$"));

fn literal_pattern(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|error| unreachable!("invalid redaction pattern {pattern}: {error}"))
}

/// Masks every sensitive field and every sensitive-looking value in
/// `payload`, at any depth.
///
/// Returns the dotted paths of the masked fields in document order. Array
/// elements appear as `[index]` segments; a masked scalar payload is reported
/// as `payload`.
pub fn redact_payload(payload: &mut Value) -> Vec<String> {
    let mut redacted = Vec::new();
    redact_value(payload, "", &mut redacted);
    redacted
}

fn redact_value(value: &mut Value, path: &str, redacted: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };

                if is_sensitive_key(key) {
                    *child = Value::String(REDACTION_PLACEHOLDER.to_owned());
                    redacted.push(child_path);
                } else {
                    redact_value(child, child_path.as_str(), redacted);
                }
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                redact_value(child, format!("{path}[{index}]").as_str(), redacted);
            }
        }
        Value::String(text) => {
            if let Some(masked) = mask_sensitive_value(text) {
                *text = masked;
                redacted.push(scalar_path(path));
            }
        }
        Value::Number(number) => {
            let is_sensitive = number
                .as_u64()
                .is_some_and(|digits| is_identifying_number(digits.to_string().as_str()));
            if is_sensitive {
                *value = Value::String(REDACTION_PLACEHOLDER.to_owned());
                redacted.push(scalar_path(path));
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

fn scalar_path(path: &str) -> String {
    if path.is_empty() {
        "payload".to_owned()
    } else {
        path.to_owned()
    }
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_PAYLOAD_FIELDS.contains(&normalize_key(key).as_str())
}

/// Folds `cardNumber`, `APIKey`, `Api-Key`, and `api key` alike to snake case.
fn normalize_key(key: &str) -> String {
    let characters: Vec<char> = key.trim().chars().collect();
    let mut normalized = String::with_capacity(characters.len() + 4);

    for (index, character) in characters.iter().copied().enumerate() {
        if character.is_ascii_uppercase() && index > 0 {
            let previous = characters[index - 1];
            let next_is_lower = characters
                .get(index + 1)
                .is_some_and(char::is_ascii_lowercase);
            if previous.is_ascii_lowercase()
                || previous.is_ascii_digit()
                || (previous.is_ascii_uppercase() && next_is_lower)
            {
                normalized.push('_');
            }
        }

        match character {
            '-' | ' ' => normalized.push('_'),
            other => normalized.extend(other.to_lowercase()),
        }
    }

    normalized
}

fn is_identifying_number(value: &str) -> bool {
    SSN_VALUE.is_match(value) || CARD_NUMBER_VALUE.is_match(value)
}

/// Returns the masked form of a sensitive-looking string value.
///
/// Emails keep their first and last local character and the domain.
fn mask_sensitive_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if is_identifying_number(trimmed) {
        return Some(REDACTION_PLACEHOLDER.to_owned());
    }

    let captures = EMAIL_VALUE.captures(trimmed)?;
    let local: Vec<char> = captures.get(1)?.as_str().chars().collect();
    let domain = captures.get(2)?.as_str();

    let masked = match local.as_slice() {
        [first, middle @ .., last] if !middle.is_empty() => {
            format!("{first}{}{last}{domain}", "*".repeat(middle.len()))
        }
        _ => format!("**{domain}"),
    };
    (masked != value).then_some(masked)
}
