//! Payload validation
//!
//! Turns an untyped JSON payload into a [`Payload`] or a specific
//! [`ValidationError`]. Nothing here touches storage; callers must validate
//! before calling [`Database::put`](crate::db::Database::put).

use crate::types::{HttpVerb, Payload};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fields that must be present in every payload.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "url",
    "response_status",
    "response_time",
    "request_type",
    "resolution",
    "browser",
];

/// Fields that may be omitted.
pub const OPTIONAL_FIELDS: [&str; 1] = ["referrer"];

/// Reason a payload was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Payload text is not valid JSON
    #[error("malformed JSON: {0}")]
    Malformed(String),

    /// Payload is valid JSON but not an object
    #[error("payload must be a JSON object")]
    NotAnObject,

    /// A required field is absent or null
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field outside the known set was supplied
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// A field has the wrong JSON type
    #[error("field {field} must be {expected}")]
    BadType {
        field: &'static str,
        expected: &'static str,
    },

    /// A numeric field is outside its allowed range
    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    /// A string field that must carry content is blank
    #[error("field {0} must not be empty")]
    EmptyField(&'static str),

    /// `request_type` is not a known HTTP verb
    #[error("unknown request type: {0}")]
    UnknownVerb(String),
}

/// Outcome of validating a raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(Payload),
    Invalid(ValidationError),
}

impl Validation {
    /// Convert into a standard result.
    pub fn into_result(self) -> Result<Payload, ValidationError> {
        match self {
            Validation::Valid(payload) => Ok(payload),
            Validation::Invalid(err) => Err(err),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }
}

/// Validate a payload given as JSON text.
pub fn validate_str(raw: &str) -> Validation {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => validate(&value),
        Err(e) => Validation::Invalid(ValidationError::Malformed(e.to_string())),
    }
}

/// Validate a decoded JSON payload.
pub fn validate(raw: &Value) -> Validation {
    match check(raw) {
        Ok(payload) => Validation::Valid(payload),
        Err(err) => Validation::Invalid(err),
    }
}

fn check(raw: &Value) -> Result<Payload, ValidationError> {
    let map = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    // Unknown keys are reported before missing ones so a misspelled field
    // names the actual typo.
    if let Some(key) = map
        .keys()
        .find(|k| !REQUIRED_FIELDS.contains(&k.as_str()) && !OPTIONAL_FIELDS.contains(&k.as_str()))
    {
        return Err(ValidationError::UnknownField(key.clone()));
    }

    for field in REQUIRED_FIELDS {
        if map.get(field).map_or(true, Value::is_null) {
            return Err(ValidationError::MissingField(field));
        }
    }

    let url = non_empty_string(map, "url")?;
    let response_status = integer(map, "response_status")?;
    let response_time = integer(map, "response_time")?;
    let request_type = verb(map)?;
    let resolution = string(map, "resolution")?;
    let browser = non_empty_string(map, "browser")?;
    let referrer = referrer(map)?;

    if response_time < 0 {
        return Err(ValidationError::OutOfRange {
            field: "response_time",
            value: response_time.to_string(),
        });
    }
    if !(100..=599).contains(&response_status) {
        return Err(ValidationError::OutOfRange {
            field: "response_status",
            value: response_status.to_string(),
        });
    }

    Ok(Payload {
        url,
        response_status: response_status as u16,
        response_time: response_time as u64,
        request_type,
        resolution,
        browser,
        referrer,
    })
}

fn string(map: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    match map.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(ValidationError::BadType {
            field,
            expected: "a string",
        }),
    }
}

fn non_empty_string(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<String, ValidationError> {
    let value = string(map, field)?;
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(value)
}

/// Accepts a JSON integer or a string of ASCII digits with an optional sign.
fn integer(map: &Map<String, Value>, field: &'static str) -> Result<i64, ValidationError> {
    let bad_type = ValidationError::BadType {
        field,
        expected: "an integer",
    };

    match map.get(field) {
        Some(Value::Number(n)) if n.is_u64() && n.as_i64().is_none() => {
            Err(ValidationError::OutOfRange {
                field,
                value: n.to_string(),
            })
        }
        Some(Value::Number(n)) => n.as_i64().ok_or(bad_type),
        Some(Value::String(s)) => {
            let s = s.trim();
            let digits = s.strip_prefix('-').unwrap_or(s);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad_type);
            }
            s.parse::<i64>().map_err(|_| ValidationError::OutOfRange {
                field,
                value: s.to_string(),
            })
        }
        _ => Err(bad_type),
    }
}

fn verb(map: &Map<String, Value>) -> Result<HttpVerb, ValidationError> {
    let raw = string(map, "request_type")?;
    raw.parse::<HttpVerb>()
        .map_err(|_| ValidationError::UnknownVerb(raw))
}

fn referrer(map: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
    match map.get("referrer") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::BadType {
            field: "referrer",
            expected: "a string or null",
        }),
    }
}
