//! Completion adapter error types.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Result type for completion operations.
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Errors raised while resolving a provider or generating a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Provider with ID {0} not found")]
    ProviderNotFound(i64),

    #[error("Provider {0} is inactive")]
    ProviderInactive(String),

    #[error("Provider {0} has no API key configured")]
    ProviderUnconfigured(String),

    /// The vendor call failed or timed out.
    #[error("completion failed for provider {provider}: {source}")]
    Failed {
        provider: String,
        #[source]
        source: VendorError,
    },

    /// Provider lookup failed in the store.
    #[error("provider lookup failed: {0}")]
    Store(#[from] crate::store::StoreError),
}

impl CompletionError {
    pub fn failed(provider: impl Into<String>, source: VendorError) -> Self {
        Self::Failed {
            provider: provider.into(),
            source,
        }
    }
}

/// Failure talking to a vendor API.
#[derive(Debug, Error)]
pub enum VendorError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Vendor returned a non-success status.
    #[error("vendor returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    /// Response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// No response within the configured bound.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_carries_cause() {
        let err = CompletionError::failed("claude", VendorError::Timeout(Duration::from_secs(60)));
        assert_eq!(
            err.to_string(),
            "completion failed for provider claude: timed out after 60s"
        );
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "timed out after 60s");
    }

    #[test]
    fn test_provider_errors_display() {
        assert_eq!(
            CompletionError::ProviderNotFound(3).to_string(),
            "Provider with ID 3 not found"
        );
        assert_eq!(
            CompletionError::ProviderInactive("gpt".into()).to_string(),
            "Provider gpt is inactive"
        );
    }
}
