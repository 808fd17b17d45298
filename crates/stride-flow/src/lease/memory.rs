//! In-memory lease registry for testing.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::error::{Error, Result};

use super::{JobLease, LeaseResult, RenewResult};

/// Default lease TTL.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct LeaseRow {
    holder_id: String,
    lease_token: String,
    expires_at: DateTime<Utc>,
}

impl LeaseRow {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory [`JobLease`] implementation.
///
/// Suitable for tests and single-process deployments only; leases are not
/// shared across process boundaries.
#[derive(Debug)]
pub struct InMemoryLeaseRegistry {
    leases: RwLock<HashMap<String, LeaseRow>>,
    ttl: Duration,
}

impl Default for InMemoryLeaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeaseRegistry {
    /// Creates a registry with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_LEASE_TTL)
    }

    /// Creates a registry with a custom TTL.
    ///
    /// Short TTLs are useful to exercise expiry takeover in tests.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            leases: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn chrono_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(30))
    }
}

#[async_trait]
impl JobLease for InMemoryLeaseRegistry {
    async fn try_acquire(&self, job_name: &str, instance_id: &str) -> Result<LeaseResult> {
        let now = Utc::now();
        let mut leases = self.leases.write().map_err(poison_err)?;

        if let Some(existing) = leases.get(job_name) {
            if !existing.is_expired(now) {
                return Ok(LeaseResult::Held {
                    current_holder: Some(existing.holder_id.clone()),
                });
            }
        }

        let lease_token = Ulid::new().to_string();
        leases.insert(
            job_name.to_string(),
            LeaseRow {
                holder_id: instance_id.to_string(),
                lease_token: lease_token.clone(),
                expires_at: now + self.chrono_ttl(),
            },
        );

        Ok(LeaseResult::Acquired {
            lease_token,
            lease_duration: self.ttl,
        })
    }

    async fn renew(&self, job_name: &str, lease_token: &str) -> Result<RenewResult> {
        let now = Utc::now();
        let mut leases = self.leases.write().map_err(poison_err)?;

        let Some(row) = leases.get_mut(job_name) else {
            return Ok(RenewResult::InvalidToken);
        };

        if row.lease_token != lease_token {
            return Ok(RenewResult::InvalidToken);
        }

        if row.is_expired(now) {
            return Ok(RenewResult::Lost);
        }

        row.expires_at = now + self.chrono_ttl();
        Ok(RenewResult::Renewed {
            lease_duration: self.ttl,
        })
    }

    async fn release(&self, job_name: &str, lease_token: &str) -> Result<bool> {
        let mut leases = self.leases.write().map_err(poison_err)?;

        match leases.get(job_name) {
            Some(row) if row.lease_token == lease_token => {
                leases.remove(job_name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release() -> Result<()> {
        let registry = InMemoryLeaseRegistry::new();

        let result = registry.try_acquire("discover-blocks", "instance-1").await?;
        assert!(result.is_acquired());

        let token = result.lease_token().unwrap().to_string();
        assert!(registry.release("discover-blocks", &token).await?);

        // Released lease can be re-acquired immediately.
        let again = registry.try_acquire("discover-blocks", "instance-2").await?;
        assert!(again.is_acquired());
        Ok(())
    }

    #[tokio::test]
    async fn second_acquisition_is_denied() -> Result<()> {
        let registry = InMemoryLeaseRegistry::new();

        let first = registry.try_acquire("prepare-boost-5", "instance-1").await?;
        assert!(first.is_acquired());

        let second = registry.try_acquire("prepare-boost-5", "instance-2").await?;
        assert_eq!(
            second,
            LeaseResult::Held {
                current_holder: Some("instance-1".to_string())
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn leases_are_independent_per_job() -> Result<()> {
        let registry = InMemoryLeaseRegistry::new();

        assert!(registry
            .try_acquire("discover-blocks", "instance-1")
            .await?
            .is_acquired());
        assert!(registry
            .try_acquire("prepare-boost-5", "instance-1")
            .await?
            .is_acquired());
        Ok(())
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() -> Result<()> {
        let registry = InMemoryLeaseRegistry::with_ttl(Duration::from_millis(1));

        let first = registry.try_acquire("discover-blocks", "instance-1").await?;
        assert!(first.is_acquired());

        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = registry.try_acquire("discover-blocks", "instance-2").await?;
        assert!(second.is_acquired());
        Ok(())
    }

    #[tokio::test]
    async fn renew_extends_and_validates_token() -> Result<()> {
        let registry = InMemoryLeaseRegistry::new();

        let result = registry.try_acquire("discover-blocks", "instance-1").await?;
        let token = result.lease_token().unwrap().to_string();

        assert!(registry.renew("discover-blocks", &token).await?.is_renewed());
        assert_eq!(
            registry.renew("discover-blocks", "wrong-token").await?,
            RenewResult::InvalidToken
        );
        Ok(())
    }

    #[tokio::test]
    async fn renew_after_expiry_is_lost() -> Result<()> {
        let registry = InMemoryLeaseRegistry::with_ttl(Duration::from_millis(1));

        let result = registry.try_acquire("discover-blocks", "instance-1").await?;
        let token = result.lease_token().unwrap().to_string();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            registry.renew("discover-blocks", &token).await?,
            RenewResult::Lost
        );
        Ok(())
    }

    #[tokio::test]
    async fn release_with_stale_token_is_refused() -> Result<()> {
        let registry = InMemoryLeaseRegistry::new();

        registry.try_acquire("discover-blocks", "instance-1").await?;
        assert!(!registry.release("discover-blocks", "stale").await?);
        Ok(())
    }
}
