//! Configuration loader implementations.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::schema::RecallConfig;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read config file: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// The configuration document was not valid JSON for the schema.
    #[error("failed to parse config: {source}")]
    Parse {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
    /// An environment override could not be parsed.
    #[error("invalid value `{value}` for {var}")]
    InvalidOverride {
        /// Environment variable name.
        var: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
    /// The loaded configuration failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Parses a JSON document, applies environment overrides and validates.
///
/// # Errors
///
/// Returns [`ConfigError`] when parsing, an override, or validation fails.
pub fn load_from_str(document: &str) -> ConfigResult<RecallConfig> {
    let config: RecallConfig = serde_json::from_str(document)?;
    finish(config, |var| std::env::var(var).ok())
}

/// Reads a JSON file, applies environment overrides and validates.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or parsed, or the
/// result is invalid.
pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<RecallConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), "loaded recall config file");
    load_from_str(&raw)
}

/// Builds a configuration from defaults plus environment overrides.
///
/// # Errors
///
/// Returns [`ConfigError`] when an override is malformed or the result is
/// invalid.
pub fn load_from_env() -> ConfigResult<RecallConfig> {
    finish(RecallConfig::default(), |var| std::env::var(var).ok())
}

fn finish<F>(mut config: RecallConfig, lookup: F) -> ConfigResult<RecallConfig>
where
    F: Fn(&'static str) -> Option<String>,
{
    apply_overrides(&mut config, lookup)?;
    config.validate()?;
    Ok(config)
}

fn apply_overrides<F>(config: &mut RecallConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&'static str) -> Option<String>,
{
    override_field(&lookup, "RECALL_CACHE_CAPACITY", &mut config.cache.capacity)?;
    override_field(
        &lookup,
        "RECALL_CACHE_MAX_MESSAGES",
        &mut config.cache.max_messages_per_session,
    )?;
    override_field(&lookup, "RECALL_CACHE_TTL_SECS", &mut config.cache.ttl_secs)?;
    override_field(
        &lookup,
        "RECALL_MAX_TOKENS",
        &mut config.compaction.max_tokens,
    )?;
    override_field(
        &lookup,
        "RECALL_OVERFETCH_FACTOR",
        &mut config.fallback.overfetch_factor,
    )?;
    override_field(&lookup, "RECALL_MAX_FETCH", &mut config.fallback.max_fetch)?;
    Ok(())
}

fn override_field<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> ConfigResult<()>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(value) = lookup(var) else {
        return Ok(());
    };
    *slot = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { var, value })?;
    debug!(var, "applied config override");
    Ok(())
}
