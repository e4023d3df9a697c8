//! # Env Store
//!
//! Disk side of the backend `.env` file. Parsing lives in
//! [`medx_core::env`]; this module reads, writes and creates the file.

use std::path::{Path, PathBuf};

use rand::RngCore;
use tracing::{debug, info};

use medx_core::env::{
    build_database_url, env_value, placeholder_env_content, upsert_env_key, ConnectionConfig,
    DATABASE_URL_KEY, SECRET_KEY_KEY,
};
use medx_core::validation::{validate_setup_form, SetupForm};

use crate::config::ShellPaths;
use crate::error::SupervisorResult;

/// Bytes of entropy in a generated secret.
pub const SECRET_BYTES: usize = 32;

/// Guarantees the env file exists and returns its path.
///
/// First run copies `<resources>/.env.example` when bundled, otherwise
/// writes placeholder keys. Failures are logged and absorbed; the path is
/// returned regardless.
pub fn ensure_env_file(paths: &ShellPaths) -> PathBuf {
    let env_path = paths.env_path();
    if env_path.exists() {
        return env_path;
    }

    if let Err(e) = create_env_file(&env_path, &paths.env_example_path()) {
        debug!(?env_path, error = %e, "Could not create env file");
    }
    env_path
}

fn create_env_file(env_path: &Path, example: &Path) -> std::io::Result<()> {
    if let Some(parent) = env_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if example.is_file() {
        std::fs::copy(example, env_path)?;
        info!(?env_path, ?example, "Env file created from bundled example");
    } else {
        std::fs::write(env_path, placeholder_env_content())?;
        info!(?env_path, "Env file created with placeholder values");
    }
    Ok(())
}

/// Value of `key` in the env file; empty on any failure.
pub fn read_env_value(path: &Path, key: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => env_value(&content, key),
        Err(e) => {
            debug!(?path, key, error = %e, "Env file not readable");
            String::new()
        }
    }
}

/// Parsed connection settings of the env file. A missing file yields
/// empty keys and default fields.
pub fn load_connection_config(path: &Path) -> ConnectionConfig {
    let content = std::fs::read_to_string(path).unwrap_or_else(|e| {
        debug!(?path, error = %e, "Env file not readable");
        String::new()
    });
    ConnectionConfig::from_env_content(path.display().to_string(), &content)
}

/// Returns true when the env file holds a connection services may use.
pub fn is_env_configured(path: &Path) -> bool {
    load_connection_config(path).is_valid()
}

/// Validates the setup form and writes both keys into the env file.
///
/// Other lines of the file are preserved.
pub fn save_connection(path: &Path, form: &SetupForm) -> SupervisorResult<ConnectionConfig> {
    validate_setup_form(form)?;
    let fields = form.to_fields()?;
    let database_url = build_database_url(&fields);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let content = upsert_env_key(&existing, DATABASE_URL_KEY, &database_url);
    let content = upsert_env_key(&content, SECRET_KEY_KEY, form.secret_key.trim());
    std::fs::write(path, &content)?;

    info!(?path, host = %fields.host, port = fields.port, db = %fields.db, "Connection settings saved");
    Ok(ConnectionConfig::from_env_content(
        path.display().to_string(),
        &content,
    ))
}

/// A fresh 64-character hex secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
