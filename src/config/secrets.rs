//! Indirect secret resolution.
//!
//! A configuration value written as `"!secret KEY"` is looked up in the secrets YAML file, which
//! maps key names to plain strings. Any other value passes through untouched, so literal keys
//! keep working for local experiments.

use serde::{Deserialize, Deserializer, de::Error as _};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SECRET_PREFIX: &str = "!secret";

/// Errors raised while resolving a `!secret` reference.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The secrets file does not exist.
    #[error("Secret file not found: {0}")]
    FileNotFound(PathBuf),
    /// The secrets file exists but could not be read.
    #[error("Failed to read secret file {path}: {source}")]
    Io {
        /// Secrets file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The secrets file is not a YAML mapping.
    #[error("Failed to parse secret file {path}: {message}")]
    Parse {
        /// Secrets file path.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// The reference named a key that the secrets file does not define.
    #[error("Secret key '{key}' not found in {path}")]
    KeyNotFound {
        /// Missing key.
        key: String,
        /// Secrets file path.
        path: PathBuf,
    },
    /// `!secret` was given without a key name.
    #[error("Malformed secret reference '{0}': expected '!secret KEY'")]
    MalformedReference(String),
}

/// Resolves `!secret` references against a fixed secrets file.
#[derive(Debug, Clone)]
pub struct SecretResolver {
    path: PathBuf,
}

impl SecretResolver {
    /// Resolver backed by the secrets file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing secrets file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve `value`, returning it unchanged when it is not a secret reference.
    pub fn resolve(&self, value: &str) -> Result<String, SecretError> {
        resolve_secret(value, &self.path)
    }

    /// Resolve an optional value; `None` stays `None`.
    pub fn resolve_optional(&self, value: Option<&str>) -> Result<Option<String>, SecretError> {
        value.map(|raw| self.resolve(raw)).transpose()
    }
}

/// Resolve `"!secret KEY"` from the YAML file at `secret_path`; other values are returned as-is.
pub fn resolve_secret(value: &str, secret_path: &Path) -> Result<String, SecretError> {
    let Some(key) = parse_reference(value)? else {
        return Ok(value.to_string());
    };

    if !secret_path.exists() {
        return Err(SecretError::FileNotFound(secret_path.to_path_buf()));
    }

    let contents = fs::read_to_string(secret_path).map_err(|source| SecretError::Io {
        path: secret_path.to_path_buf(),
        source,
    })?;
    let secrets: Mapping = serde_yaml::from_str(&contents).map_err(|error| {
        tracing::error!(key, error = %error, "Error loading secret key");
        SecretError::Parse {
            path: secret_path.to_path_buf(),
            message: error.to_string(),
        }
    })?;

    match secrets.get(key) {
        Some(Value::String(secret)) => Ok(secret.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        _ => {
            tracing::error!(key, path = %secret_path.display(), "Secret key not found");
            Err(SecretError::KeyNotFound {
                key: key.to_string(),
                path: secret_path.to_path_buf(),
            })
        }
    }
}

/// Accept a secret reference written either quoted (`"!secret KEY"`) or as a bare YAML tag
/// (`!secret KEY`), normalising both to the quoted form.
pub(crate) fn deserialize_reference<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Tagged(tagged)) if tagged.tag == "secret" => match tagged.value {
            Value::String(key) => Ok(Some(format!("{SECRET_PREFIX} {key}"))),
            _ => Err(D::Error::custom("`!secret` must be followed by a key name")),
        },
        Some(_) => Err(D::Error::custom(
            "expected a string or a `!secret KEY` reference",
        )),
    }
}

fn parse_reference(value: &str) -> Result<Option<&str>, SecretError> {
    let trimmed = value.trim();
    let Some(rest) = trimmed.strip_prefix(SECRET_PREFIX) else {
        return Ok(None);
    };
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Ok(None);
    }
    rest.split_whitespace()
        .next()
        .map(Some)
        .ok_or_else(|| SecretError::MalformedReference(value.to_string()))
}
