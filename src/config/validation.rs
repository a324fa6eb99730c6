//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Base URL must parse and carry a host
//! - Opaque key must survive a query string untouched and never collide
//!   with positional (digit) keys
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use url::Url;

use crate::config::schema::RouterConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a deserialized config.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.base_url) {
        Ok(url) if url.host_str().map_or(true, str::is_empty) => {
            errors.push(ValidationError::new("base_url", "must include a host"));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("base_url", e.to_string())),
    }

    let key = &config.opaque_key;
    if key.is_empty() {
        errors.push(ValidationError::new("opaque_key", "must not be empty"));
    } else if key.bytes().all(|b| b.is_ascii_digit()) {
        errors.push(ValidationError::new("opaque_key", "must not be all digits"));
    } else if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'~'))
    {
        errors.push(ValidationError::new("opaque_key", "must be URL-safe"));
    }

    for (field, name) in [
        ("root_endpoint", &config.root_endpoint),
        ("missing_endpoint", &config.missing_endpoint),
    ] {
        if matches!(name, Some(n) if n.trim().is_empty()) {
            errors.push(ValidationError::new(field, "must not be blank"));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
