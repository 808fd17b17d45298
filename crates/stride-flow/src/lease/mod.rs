//! Per-job lease coordination.
//!
//! The [`JobLease`] trait provides a pluggable TTL lease keyed by job name,
//! separate from storage concerns. Each scheduled job acquires its lease
//! before syncing its cursor and releases it after the cursor commit; if
//! acquisition fails the tick is a no-op.
//!
//! ## Safety
//!
//! Cursor rows and single-attribution checks are not transactionally safe
//! against concurrent writers, so the lease must guarantee at most one
//! in-flight execution per job name at any time, even across process
//! restarts and multiple instances.
//!
//! ## Design Principles
//!
//! - **Leases, not locks**: Holders get time-bounded leases, never
//!   indefinite locks; a crashed holder is fenced out by TTL expiry
//! - **Heartbeat renewal**: Long ticks renew between units of work
//! - **Graceful handoff**: Holders release voluntarily after cursor commit

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Result of a lease acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseResult {
    /// Successfully acquired the lease.
    Acquired {
        /// Token that must be used for renewal and release.
        lease_token: String,
        /// Duration until the lease expires.
        lease_duration: Duration,
    },
    /// The lease is held by another instance.
    Held {
        /// Identifier of the current holder, if known.
        current_holder: Option<String>,
    },
}

impl LeaseResult {
    /// Returns true if the lease was acquired.
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }

    /// Returns the lease token if acquired.
    #[must_use]
    pub fn lease_token(&self) -> Option<&str> {
        match self {
            Self::Acquired { lease_token, .. } => Some(lease_token),
            Self::Held { .. } => None,
        }
    }
}

/// Result of a lease renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewResult {
    /// Successfully renewed.
    Renewed {
        /// New lease duration.
        lease_duration: Duration,
    },
    /// Lease has expired or was taken by another holder.
    Lost,
    /// The provided lease token is invalid.
    InvalidToken,
}

impl RenewResult {
    /// Returns true if the lease was successfully renewed.
    #[must_use]
    pub const fn is_renewed(&self) -> bool {
        matches!(self, Self::Renewed { .. })
    }
}

/// TTL lease abstraction for single-flight job execution.
///
/// Implementations must provide lease-based exclusion with a configurable
/// duration, renewal to maintain the lease across long ticks, and graceful
/// release for orderly handoff. Production deployments back this with a
/// conditional write on the shared store; tests use
/// [`memory::InMemoryLeaseRegistry`].
#[async_trait]
pub trait JobLease: Send + Sync {
    /// Attempts to acquire the lease for a job name.
    async fn try_acquire(&self, job_name: &str, instance_id: &str) -> Result<LeaseResult>;

    /// Renews an existing lease. Must be called before expiry.
    async fn renew(&self, job_name: &str, lease_token: &str) -> Result<RenewResult>;

    /// Voluntarily releases the lease.
    ///
    /// Returns `true` if released, `false` if the lease had already expired
    /// or was taken over by another holder.
    async fn release(&self, job_name: &str, lease_token: &str) -> Result<bool>;
}
