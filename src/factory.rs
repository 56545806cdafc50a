//! Builds the configured adapters behind their trait objects.

use std::sync::Arc;

use tracing::info;

use crate::batch::{BatchProvider, OpenAiBatchProvider};
use crate::config::{BatchProviderKind, Config, ConfigError, TraceStoreKind};
use crate::tracestore::{LangfuseBackend, TraceStore, TraceStoreAdapter};

#[cfg(any(test, feature = "mock"))]
use crate::batch::MockBatchProvider;
#[cfg(any(test, feature = "mock"))]
use crate::tracestore::MockTraceBackend;

/// Returns the bulk inference provider selected by `config.batch_provider`.
pub fn build_batch_provider(config: &Config) -> Result<Arc<dyn BatchProvider>, ConfigError> {
    let provider: Arc<dyn BatchProvider> = match config.batch_provider {
        BatchProviderKind::OpenAi => {
            let api_key =
                config
                    .openai_api_key
                    .as_deref()
                    .ok_or(ConfigError::MissingEnvVar {
                        name: Config::ENV_OPENAI_API_KEY,
                    })?;
            Arc::new(OpenAiBatchProvider::new(
                &config.openai_base_url,
                api_key,
                config.http_timeout,
            ))
        }
        #[cfg(any(test, feature = "mock"))]
        BatchProviderKind::Mock => Arc::new(MockBatchProvider::new()),
        #[cfg(not(any(test, feature = "mock")))]
        BatchProviderKind::Mock => return Err(mock_unavailable(Config::ENV_BATCH_PROVIDER)),
    };

    info!(provider = ?config.batch_provider, "Batch provider ready");
    Ok(provider)
}

/// Returns the trace store selected by `config.trace_store`.
pub fn build_trace_store(config: &Config) -> Result<Arc<dyn TraceStoreAdapter>, ConfigError> {
    let store: Arc<dyn TraceStoreAdapter> = match config.trace_store {
        TraceStoreKind::Langfuse => {
            let public_key = config.langfuse_public_key.as_deref().ok_or(
                ConfigError::MissingEnvVar {
                    name: Config::ENV_LANGFUSE_PUBLIC_KEY,
                },
            )?;
            let secret_key = config.langfuse_secret_key.as_deref().ok_or(
                ConfigError::MissingEnvVar {
                    name: Config::ENV_LANGFUSE_SECRET_KEY,
                },
            )?;
            let backend = LangfuseBackend::new(
                &config.langfuse_host,
                public_key,
                secret_key,
                config.http_timeout,
            );
            Arc::new(
                TraceStore::new(Arc::new(backend))
                    .with_fetch_concurrency(config.trace_fetch_concurrency),
            )
        }
        #[cfg(any(test, feature = "mock"))]
        TraceStoreKind::Mock => Arc::new(
            TraceStore::new(Arc::new(MockTraceBackend::new()))
                .with_fetch_concurrency(config.trace_fetch_concurrency),
        ),
        #[cfg(not(any(test, feature = "mock")))]
        TraceStoreKind::Mock => return Err(mock_unavailable(Config::ENV_TRACE_STORE)),
    };

    info!(store = ?config.trace_store, "Trace store ready");
    Ok(store)
}

#[cfg(not(any(test, feature = "mock")))]
fn mock_unavailable(name: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: "mock".to_string(),
        reason: "built without the `mock` feature".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_requires_key() {
        let config = Config::default();

        let err = build_batch_provider(&config).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar {
                name: "BATCHEVAL_OPENAI_API_KEY"
            }
        ));
    }

    #[test]
    fn test_openai_provider_with_key() {
        let config = Config {
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };

        assert!(build_batch_provider(&config).is_ok());
    }

    #[test]
    fn test_langfuse_store_requires_keys() {
        let config = Config {
            langfuse_public_key: Some("pk-lf".to_string()),
            ..Default::default()
        };

        let err = build_trace_store(&config).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar {
                name: "BATCHEVAL_LANGFUSE_SECRET_KEY"
            }
        ));
    }

    #[tokio::test]
    async fn test_mock_backends() {
        let config = Config {
            batch_provider: BatchProviderKind::Mock,
            trace_store: TraceStoreKind::Mock,
            ..Default::default()
        };

        let batches = build_batch_provider(&config).unwrap();
        let store = build_trace_store(&config).unwrap();

        assert!(batches.get_batch_status("missing").await.is_err());
        assert!(matches!(
            store.fetch_run_scores("dataset", "run").await,
            Err(crate::tracestore::TraceStoreError::RunNotFound { .. })
        ));
    }
}
