//! Runtime settings.
//!
//! Settings come from the process environment through [`Settings::from_env`],
//! from the environment plus a `.env` file through [`Settings::from_env_file`],
//! or from any key lookup through [`Settings::from_lookup`]. Everything has
//! a serde default except the two model ids, which must be supplied.

use crate::core::{ModelCatalog, ModelTier};
use crate::errors::ConfigurationError;
use crate::observability::LoggingConfig;
use crate::pipeline::{ExecutionStrategy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Model id for lightweight stages.
pub const ENV_MODEL_LITE: &str = "PODFLOW_MODEL_LITE";
/// Model id for the highest-quality stage.
pub const ENV_MODEL_PRO: &str = "PODFLOW_MODEL_PRO";
/// Model id for the standard tier; falls back to the lite model.
pub const ENV_MODEL_STANDARD: &str = "PODFLOW_MODEL_STANDARD";
/// Maximum attempts per model call.
pub const ENV_RETRY_ATTEMPTS: &str = "RETRY_ATTEMPTS";
/// `concurrent` or `sequential`.
pub const ENV_EXECUTION: &str = "PODFLOW_EXECUTION";
/// Log level filter.
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
/// Emit JSON logs when truthy.
pub const ENV_LOG_JSON: &str = "LOG_JSON";

fn default_retry_attempts() -> u32 {
    3
}

/// Model tier per built-in stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiers {
    /// Tier of the summarize stage.
    #[serde(default)]
    pub summarize: ModelTier,
    /// Tier of the key insights stage.
    #[serde(default)]
    pub key_insights: ModelTier,
    /// Tier of the search-query stage.
    #[serde(default)]
    pub search: ModelTier,
    /// Tier of the fact-check stage.
    #[serde(default = "default_fact_check_tier")]
    pub fact_check: ModelTier,
}

fn default_fact_check_tier() -> ModelTier {
    ModelTier::Pro
}

impl Default for StageTiers {
    fn default() -> Self {
        Self {
            summarize: ModelTier::Lite,
            key_insights: ModelTier::Lite,
            search: ModelTier::Lite,
            fact_check: default_fact_check_tier(),
        }
    }
}

/// All settings for one orchestrator.
///
/// Read-only once built; shared across concurrent runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Model id per tier.
    #[serde(default)]
    pub models: ModelCatalog,
    /// Tier per built-in stage.
    #[serde(default)]
    pub tiers: StageTiers,
    /// Retry policy applied to every model call.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// How independent stages are scheduled.
    #[serde(default)]
    pub execution: ExecutionStrategy,
    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings from the process environment and an env file.
    ///
    /// See [`EnvFile::load`] for how the file is found.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the file cannot be read or parsed, or
    /// for the reasons given on [`Settings::from_lookup`].
    pub fn from_env_file(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let env = EnvFile::load(path)?;
        Self::from_lookup(|key| env.get(key))
    }

    /// Reads settings through `lookup`.
    ///
    /// Empty values count as unset. All missing required keys are reported
    /// in one error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a required key is missing or a value
    /// cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let lite = get(ENV_MODEL_LITE);
        let pro = get(ENV_MODEL_PRO);
        let missing: Vec<String> = [(ENV_MODEL_LITE, &lite), (ENV_MODEL_PRO, &pro)]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| key.to_string())
            .collect();
        let (Some(lite), Some(pro)) = (lite, pro) else {
            return Err(ConfigurationError::missing(missing));
        };
        let standard = get(ENV_MODEL_STANDARD).unwrap_or_else(|| lite.clone());

        let attempts = match get(ENV_RETRY_ATTEMPTS) {
            None => default_retry_attempts(),
            Some(raw) => parse_attempts(&raw)?,
        };

        let execution = match get(ENV_EXECUTION) {
            None => ExecutionStrategy::default(),
            Some(raw) => raw.parse().map_err(|_| {
                ConfigurationError::new(format!("Invalid {ENV_EXECUTION} value: {raw}"))
                    .with_keys(vec![ENV_EXECUTION.to_string()])
            })?,
        };

        let mut logging = LoggingConfig::default();
        if let Some(level) = get(ENV_LOG_LEVEL) {
            logging.level = level.trim().to_lowercase();
        }
        if let Some(json) = get(ENV_LOG_JSON) {
            logging.json = matches!(json.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        let settings = Self {
            models: ModelCatalog::new(lite, standard, pro),
            tiers: StageTiers::default(),
            retry: RetryPolicy::new().with_max_attempts(attempts),
            execution,
            logging,
        };

        info!(
            lite = %settings.models.lite,
            standard = %settings.models.standard,
            pro = %settings.models.pro,
            retry_attempts = attempts,
            execution = %settings.execution,
            "Loaded settings"
        );
        Ok(settings)
    }

    /// Sets the model catalog.
    #[must_use]
    pub fn with_models(mut self, models: ModelCatalog) -> Self {
        self.models = models;
        self
    }

    /// Sets the stage tiers.
    #[must_use]
    pub fn with_tiers(mut self, tiers: StageTiers) -> Self {
        self.tiers = tiers;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the execution strategy.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionStrategy) -> Self {
        self.execution = execution;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

fn parse_attempts(raw: &str) -> Result<u32, ConfigurationError> {
    let parsed: i64 = raw.trim().parse().map_err(|_| {
        ConfigurationError::new(format!("Invalid {ENV_RETRY_ATTEMPTS} value: {raw}"))
            .with_keys(vec![ENV_RETRY_ATTEMPTS.to_string()])
    })?;
    let clamped = u32::try_from(parsed.max(1)).unwrap_or(u32::MAX);
    if i64::from(clamped) != parsed {
        debug!(requested = parsed, effective = clamped, "Clamped retry attempts");
    }
    Ok(clamped)
}

/// Variables read from a `.env` file.
///
/// Lookups prefer the process environment, so a variable that is already
/// set is never overridden by the file. The process environment itself is
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    path: Option<PathBuf>,
    vars: HashMap<String, String>,
}

impl EnvFile {
    /// Loads variables from `path`, or from a `.env` file found in the
    /// working directory or one of its parents when `path` is `None`.
    ///
    /// A missing `.env` is not an error when no path was given.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if an explicit file is missing, or if a
    /// file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let (path, iter) = match path {
            Some(path) => {
                let iter = dotenvy::from_path_iter(path).map_err(|err| env_file_error(path, &err))?;
                (path.to_path_buf(), iter)
            }
            None => match dotenvy::dotenv_iter() {
                Ok(iter) => (PathBuf::from(".env"), iter),
                Err(err) if err.not_found() => {
                    debug!("No .env file found");
                    return Ok(Self::default());
                }
                Err(err) => return Err(env_file_error(Path::new(".env"), &err)),
            },
        };

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|err| env_file_error(&path, &err))?;
            vars.insert(key, value);
        }
        info!(path = %path.display(), variables = vars.len(), "Loaded env file");

        Ok(Self {
            path: Some(path),
            vars,
        })
    }

    /// Builds an env file from in-memory pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            path: None,
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Returns the file the variables came from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up `key` in the process environment, then in the file.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().or_else(|| self.vars.get(key).cloned())
    }
}

fn env_file_error(path: &Path, err: &dotenvy::Error) -> ConfigurationError {
    ConfigurationError::new(format!("Failed to load env file {}: {err}", path.display()))
}
