//! Error types surfaced by providers and the resolution pipeline.

use quarry_util::HttpFetchError;
use serde_json::Value;
use thiserror::Error;

/// Failure while fetching records from a single provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The source configuration is missing a required key or has the wrong shape.
    #[error("provider configuration error: {0}")]
    Config(String),
    /// No adapter is registered for the configured kind.
    #[error("unknown provider kind '{kind}'; registered kinds: {known}")]
    UnknownKind { kind: String, known: String },
    /// The remote answered successfully but reported query-level errors.
    #[error("error while querying {target}: {errors}")]
    Query { target: String, errors: Value },
    /// Network or HTTP failure.
    #[error(transparent)]
    Transport(#[from] HttpFetchError),
}

impl ProviderError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when the content is missing or not yet propagated (HTTP 404).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Transport(error) if error.is_not_found())
    }
}

/// Failure of a whole widget resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The single configured source failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// A named source failed in multi-source mode; no partial rows are returned.
    #[error("source '{source_key}' failed: {error}")]
    Source {
        source_key: String,
        #[source]
        error: ProviderError,
    },
}

impl ResolveError {
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            Self::Provider(error) | Self::Source { error, .. } => error,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.provider_error().is_not_found()
    }
}
