//! # Validation Module
//!
//! Validation of the first-run setup form before it is written to disk.
//!
//! The form is only the UI's view of the connection; the authoritative
//! check is [`crate::env::check_connection`] on what lands in the file. The
//! rules here reject what would obviously fail that check, with messages a
//! receptionist can act on.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::env::{DatabaseFields, MIN_SECRET_LEN, PLACEHOLDER_MARKER};
use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Payload of `save_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SetupForm {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u32>,
    #[serde(default)]
    pub db: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub secret_key: String,
}

impl SetupForm {
    /// Connection fields with surrounding whitespace removed and defaults
    /// applied for host and port.
    pub fn to_fields(&self) -> ValidationResult<DatabaseFields> {
        let defaults = DatabaseFields::default();
        let port = match self.port {
            None => defaults.port,
            Some(p) => validate_port(p)?,
        };
        let host = self.host.trim();

        Ok(DatabaseFields {
            host: if host.is_empty() {
                defaults.host
            } else {
                host.to_string()
            },
            port,
            db: self.db.trim().to_string(),
            user: self.user.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

/// Validates a setup form.
///
/// ## Rules
/// - `db`, `user` and `secretKey` must be non-empty
/// - none of them may carry the placeholder marker
/// - `secretKey` must be at least 24 characters
/// - `port`, when given, must be within 1..=65535
pub fn validate_setup_form(form: &SetupForm) -> ValidationResult<()> {
    validate_required("db", &form.db)?;
    validate_required("user", &form.user)?;
    validate_required("secretKey", &form.secret_key)?;

    validate_secret(form.secret_key.trim())?;

    if let Some(port) = form.port {
        validate_port(port)?;
    }

    Ok(())
}

fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.to_ascii_uppercase().contains(PLACEHOLDER_MARKER) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "placeholder value must be replaced".to_string(),
        });
    }
    Ok(())
}

fn validate_secret(secret: &str) -> ValidationResult<()> {
    if secret.chars().count() < MIN_SECRET_LEN {
        return Err(ValidationError::TooShort {
            field: "secretKey".to_string(),
            min: MIN_SECRET_LEN,
        });
    }
    Ok(())
}

fn validate_port(port: u32) -> ValidationResult<u16> {
    match u16::try_from(port) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(ValidationError::OutOfRange {
            field: "port".to_string(),
            min: 1,
            max: 65_535,
        }),
    }
}
