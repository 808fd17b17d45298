//! Fitness provider integration contracts.
//!
//! The OAuth token-exchange mechanics live outside this crate; the pipeline
//! only depends on the driver contract: given a user's integration, fetch
//! activity detail from the provider API. Token refresh is the driver's
//! internal concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stride_core::Address;

use crate::error::{Error, Result};

/// A user's OAuth link to a fitness provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIntegration {
    /// Provider name (e.g. "strava").
    pub provider: String,
    /// The linked subject's address.
    pub address: Address,
    /// Provider-side owner identifier.
    pub owner_id: u64,
    /// Current access token.
    pub access_token: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
}

/// Persists provider integrations.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Gets the integration for `(provider, address)`, if one exists.
    async fn get_integration(
        &self,
        provider: &str,
        address: &Address,
    ) -> Result<Option<ProviderIntegration>>;

    /// Creates or replaces an integration.
    async fn put_integration(&self, integration: ProviderIntegration) -> Result<()>;
}

/// Opaque per-provider OAuth driver.
///
/// Implementations call the provider API with the integration's credentials,
/// refreshing tokens internally as needed.
#[async_trait]
pub trait OAuthDriver: Send + Sync {
    /// Fetches raw activity detail for a provider-side activity ID.
    ///
    /// The returned value is the provider's own JSON shape; mapping into the
    /// internal detail shape is the caller's concern.
    async fn fetch_activity(
        &self,
        integration: &ProviderIntegration,
        remote_id: u64,
    ) -> Result<serde_json::Value>;
}

/// In-memory integration store for testing.
#[derive(Debug, Default)]
pub struct InMemoryIntegrationStore {
    rows: std::sync::RwLock<Vec<ProviderIntegration>>,
}

impl InMemoryIntegrationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn get_integration(
        &self,
        provider: &str,
        address: &Address,
    ) -> Result<Option<ProviderIntegration>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| Error::storage("lock poisoned"))?;
        Ok(rows
            .iter()
            .find(|i| i.provider == provider && &i.address == address)
            .cloned())
    }

    async fn put_integration(&self, integration: ProviderIntegration) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| Error::storage("lock poisoned"))?;
        rows.retain(|i| !(i.provider == integration.provider && i.address == integration.address));
        rows.push(integration);
        Ok(())
    }
}

/// Scripted OAuth driver for testing.
///
/// Serves canned JSON responses per remote ID and can be flipped into a
/// failing state to exercise enrichment failure paths.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    responses: std::sync::RwLock<std::collections::HashMap<u64, serde_json::Value>>,
    failing: std::sync::atomic::AtomicBool,
}

impl ScriptedDriver {
    /// Creates an empty driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response for a remote activity ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn script(&self, remote_id: u64, response: serde_json::Value) -> Result<()> {
        let mut responses = self
            .responses
            .write()
            .map_err(|_| Error::storage("lock poisoned"))?;
        responses.insert(remote_id, response);
        Ok(())
    }

    /// Makes subsequent API calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl OAuthDriver for ScriptedDriver {
    async fn fetch_activity(
        &self,
        _integration: &ProviderIntegration,
        remote_id: u64,
    ) -> Result<serde_json::Value> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::remote("provider API unavailable"));
        }

        let responses = self
            .responses
            .read()
            .map_err(|_| Error::storage("lock poisoned"))?;
        responses
            .get(&remote_id)
            .cloned()
            .ok_or_else(|| Error::remote(format!("activity {remote_id} not found at provider")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration() -> ProviderIntegration {
        ProviderIntegration {
            provider: "strava".into(),
            address: Address::new("TADDR"),
            owner_id: 42,
            access_token: "token".into(),
            expires_at: Utc::now() + chrono::Duration::hours(6),
        }
    }

    #[tokio::test]
    async fn integration_store_roundtrip() -> Result<()> {
        let store = InMemoryIntegrationStore::new();
        assert!(store
            .get_integration("strava", &Address::new("TADDR"))
            .await?
            .is_none());

        store.put_integration(integration()).await?;

        let found = store
            .get_integration("strava", &Address::new("TADDR"))
            .await?;
        assert_eq!(found.map(|i| i.owner_id), Some(42));
        Ok(())
    }

    #[tokio::test]
    async fn scripted_driver_serves_and_fails() -> Result<()> {
        let driver = ScriptedDriver::new();
        driver.script(987, serde_json::json!({"name": "Morning Run"}))?;

        let detail = driver.fetch_activity(&integration(), 987).await?;
        assert_eq!(detail["name"], "Morning Run");

        assert!(driver.fetch_activity(&integration(), 1).await.is_err());

        driver.set_failing(true);
        let result = driver.fetch_activity(&integration(), 987).await;
        assert!(matches!(result, Err(Error::RemoteUnavailable { .. })));
        Ok(())
    }
}
