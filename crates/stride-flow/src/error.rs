//! Error types for the pipeline domain.
//!
//! The taxonomy distinguishes transient tick-level failures (remote node
//! unreachable, lease held elsewhere) from per-subject outcomes (attribution
//! denied, signing failure) and from idempotent no-ops (duplicates). Tick
//! errors abort the tick without cursor advancement; subject errors are
//! caught, logged, and isolated from the rest of the batch.

use stride_core::{Address, MosaicId, Slug};

/// The result type used throughout stride-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input; never retried.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the violation.
        message: String,
    },

    /// An idempotent duplicate; callers treat this as a no-op, not a failure.
    #[error("duplicate: {message}")]
    Duplicate {
        /// What was duplicated.
        message: String,
    },

    /// The remote ledger node or provider API is unavailable; retried on the
    /// next tick.
    #[error("remote unavailable: {message}")]
    RemoteUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// A remote call exceeded its per-call timeout budget.
    #[error("remote call timed out after {elapsed_ms}ms: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// Elapsed milliseconds before the deadline fired.
        elapsed_ms: u64,
    },

    /// The subject already holds the asset; an expected business outcome.
    #[error("attribution denied: {address} already holds mosaic {mosaic_id}")]
    AttributionDenied {
        /// The subject address.
        address: Address,
        /// The mosaic that was already attributed.
        mosaic_id: MosaicId,
    },

    /// No provider integration exists for the subject; terminal per-subject.
    #[error("no {provider} integration for {address}")]
    IntegrationMissing {
        /// The provider name.
        provider: String,
        /// The subject address.
        address: Address,
    },

    /// Signing failed for one subject; isolated from the batch.
    #[error("signing failed: {message}")]
    Signing {
        /// Description of the signer failure.
        message: String,
    },

    /// An activity record was expected but not found.
    #[error("activity not found: {slug}")]
    ActivityNotFound {
        /// The missing slug.
        slug: Slug,
    },

    /// An invalid state transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// The job lease is held by another instance; the tick is a no-op.
    #[error("lease for job '{job_name}' held by another instance")]
    LeaseUnavailable {
        /// The contended job name.
        job_name: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Invalid service configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An error from stride-core.
    #[error("core error: {0}")]
    Core(#[from] stride_core::Error),
}

impl Error {
    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new duplicate error.
    #[must_use]
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate {
            message: message.into(),
        }
    }

    /// Creates a new remote-unavailable error.
    #[must_use]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if the error is transient and the tick should retry from
    /// the same cursor next time.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable { .. } | Self::Timeout { .. } | Self::LeaseUnavailable { .. }
        )
    }

    /// Returns true if the error is an idempotent no-op rather than a failure.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn attribution_denied_display() {
        let err = Error::AttributionDenied {
            address: Address::new("TADDR"),
            mosaic_id: MosaicId::new("boost.50"),
        };
        let msg = err.to_string();
        assert!(msg.contains("TADDR"));
        assert!(msg.contains("boost.50"));
    }

    #[test]
    fn transient_classification() {
        assert!(Error::remote("node down").is_transient());
        assert!(Error::Timeout {
            operation: "search_blocks".into(),
            elapsed_ms: 5000,
        }
        .is_transient());
        assert!(!Error::validation("bad payload").is_transient());
    }

    #[test]
    fn duplicate_classification() {
        assert!(Error::duplicate("activity 42").is_duplicate());
        assert!(!Error::storage("io").is_duplicate());
    }

    #[test]
    fn storage_error_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::storage_with_source("read failed", io);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }
}
