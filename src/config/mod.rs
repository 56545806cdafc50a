//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `BATCHEVAL_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::batch::DEFAULT_OPENAI_BASE_URL;
use crate::constants::{
    DEFAULT_COMPLETION_WINDOW, DEFAULT_EMBEDDING_MODEL, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_LANGFUSE_HOST, DEFAULT_TRACE_FETCH_CONCURRENCY,
};
use crate::evaluation::PipelineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Bulk inference backend selection.
pub enum BatchProviderKind {
    #[default]
    OpenAi,
    /// In-memory provider (requires the `mock` feature).
    Mock,
}

impl FromStr for BatchProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown batch provider: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Trace store backend selection.
pub enum TraceStoreKind {
    #[default]
    Langfuse,
    /// In-memory store (requires the `mock` feature).
    Mock,
}

impl FromStr for TraceStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "langfuse" => Ok(Self::Langfuse),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown trace store: {s}")),
        }
    }
}

/// Pipeline configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `BATCHEVAL_*` overrides on top of defaults.
#[derive(Clone)]
pub struct Config {
    /// OpenAI API base URL. Default: `https://api.openai.com/v1`.
    pub openai_base_url: String,

    pub openai_api_key: Option<String>,

    /// Default: `openai`.
    pub batch_provider: BatchProviderKind,

    /// Default: `langfuse`.
    pub trace_store: TraceStoreKind,

    /// Langfuse host. Default: `https://cloud.langfuse.com`.
    pub langfuse_host: String,

    pub langfuse_public_key: Option<String>,

    pub langfuse_secret_key: Option<String>,

    /// Default: `text-embedding-3-large`.
    pub embedding_model: String,

    /// Completion window requested for every bulk job. Default: `24h`.
    pub completion_window: String,

    /// Timeout applied to every HTTP request. Default: 120 seconds.
    pub http_timeout: Duration,

    /// Traces fetched at once when reading a run back. Default: `8`.
    pub trace_fetch_concurrency: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("batch_provider", &self.batch_provider)
            .field("trace_store", &self.trace_store)
            .field("langfuse_host", &self.langfuse_host)
            .field("langfuse_public_key", &self.langfuse_public_key)
            .field(
                "langfuse_secret_key",
                &self.langfuse_secret_key.as_ref().map(|_| "***"),
            )
            .field("embedding_model", &self.embedding_model)
            .field("completion_window", &self.completion_window)
            .field("http_timeout", &self.http_timeout)
            .field("trace_fetch_concurrency", &self.trace_fetch_concurrency)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_api_key: None,
            batch_provider: BatchProviderKind::default(),
            trace_store: TraceStoreKind::default(),
            langfuse_host: DEFAULT_LANGFUSE_HOST.to_string(),
            langfuse_public_key: None,
            langfuse_secret_key: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            completion_window: DEFAULT_COMPLETION_WINDOW.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            trace_fetch_concurrency: DEFAULT_TRACE_FETCH_CONCURRENCY,
        }
    }
}

impl Config {
    pub(crate) const ENV_OPENAI_BASE_URL: &'static str = "BATCHEVAL_OPENAI_BASE_URL";
    pub(crate) const ENV_OPENAI_API_KEY: &'static str = "BATCHEVAL_OPENAI_API_KEY";
    pub(crate) const ENV_BATCH_PROVIDER: &'static str = "BATCHEVAL_BATCH_PROVIDER";
    pub(crate) const ENV_TRACE_STORE: &'static str = "BATCHEVAL_TRACE_STORE";
    pub(crate) const ENV_LANGFUSE_HOST: &'static str = "BATCHEVAL_LANGFUSE_HOST";
    pub(crate) const ENV_LANGFUSE_PUBLIC_KEY: &'static str = "BATCHEVAL_LANGFUSE_PUBLIC_KEY";
    pub(crate) const ENV_LANGFUSE_SECRET_KEY: &'static str = "BATCHEVAL_LANGFUSE_SECRET_KEY";
    pub(crate) const ENV_EMBEDDING_MODEL: &'static str = "BATCHEVAL_EMBEDDING_MODEL";
    pub(crate) const ENV_COMPLETION_WINDOW: &'static str = "BATCHEVAL_COMPLETION_WINDOW";
    pub(crate) const ENV_HTTP_TIMEOUT_SECS: &'static str = "BATCHEVAL_HTTP_TIMEOUT_SECS";
    pub(crate) const ENV_TRACE_FETCH_CONCURRENCY: &'static str =
        "BATCHEVAL_TRACE_FETCH_CONCURRENCY";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let openai_base_url =
            Self::parse_string_from_env(Self::ENV_OPENAI_BASE_URL, defaults.openai_base_url);
        let openai_api_key = Self::parse_optional_string_from_env(Self::ENV_OPENAI_API_KEY);
        let batch_provider =
            Self::parse_kind_from_env(Self::ENV_BATCH_PROVIDER, defaults.batch_provider)?;
        let trace_store = Self::parse_kind_from_env(Self::ENV_TRACE_STORE, defaults.trace_store)?;
        let langfuse_host =
            Self::parse_string_from_env(Self::ENV_LANGFUSE_HOST, defaults.langfuse_host);
        let langfuse_public_key =
            Self::parse_optional_string_from_env(Self::ENV_LANGFUSE_PUBLIC_KEY);
        let langfuse_secret_key =
            Self::parse_optional_string_from_env(Self::ENV_LANGFUSE_SECRET_KEY);
        let embedding_model =
            Self::parse_string_from_env(Self::ENV_EMBEDDING_MODEL, defaults.embedding_model);
        let completion_window =
            Self::parse_string_from_env(Self::ENV_COMPLETION_WINDOW, defaults.completion_window);
        let http_timeout = Duration::from_secs(Self::parse_u64_from_env(
            Self::ENV_HTTP_TIMEOUT_SECS,
            defaults.http_timeout.as_secs(),
        )?);
        let trace_fetch_concurrency = Self::parse_u64_from_env(
            Self::ENV_TRACE_FETCH_CONCURRENCY,
            defaults.trace_fetch_concurrency as u64,
        )? as usize;

        Ok(Self {
            openai_base_url,
            openai_api_key,
            batch_provider,
            trace_store,
            langfuse_host,
            langfuse_public_key,
            langfuse_secret_key,
            embedding_model,
            completion_window,
            http_timeout,
            trace_fetch_concurrency,
        })
    }

    /// Checks credentials for the selected backends and basic invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_provider == BatchProviderKind::OpenAi && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingEnvVar {
                name: Self::ENV_OPENAI_API_KEY,
            });
        }

        if self.trace_store == TraceStoreKind::Langfuse {
            if self.langfuse_public_key.is_none() {
                return Err(ConfigError::MissingEnvVar {
                    name: Self::ENV_LANGFUSE_PUBLIC_KEY,
                });
            }
            if self.langfuse_secret_key.is_none() {
                return Err(ConfigError::MissingEnvVar {
                    name: Self::ENV_LANGFUSE_SECRET_KEY,
                });
            }
        }

        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: Self::ENV_HTTP_TIMEOUT_SECS,
                value: "0".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }

        if self.trace_fetch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: Self::ENV_TRACE_FETCH_CONCURRENCY,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Embedding model and completion window for [`crate::evaluation::EvaluationPipeline`].
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            embedding_model: self.embedding_model.clone(),
            completion_window: self.completion_window.clone(),
        }
    }

    fn parse_kind_from_env<T>(var_name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr<Err = String>,
    {
        match Self::parse_optional_string_from_env(var_name) {
            Some(value) => value.parse().map_err(|reason| ConfigError::InvalidValue {
                name: var_name,
                value,
                reason,
            }),
            None => Ok(default),
        }
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        Self::parse_optional_string_from_env(var_name).unwrap_or(default)
    }

    fn parse_u64_from_env(var_name: &'static str, default: u64) -> Result<u64, ConfigError> {
        match Self::parse_optional_string_from_env(var_name) {
            Some(value) => value.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    name: var_name,
                    reason: e.to_string(),
                    value,
                }
            }),
            None => Ok(default),
        }
    }
}
