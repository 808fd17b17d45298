//! Transaction signing abstraction.
//!
//! The signature algorithm itself is an external capability; the pipeline
//! only needs a contract that turns `(mosaic, amount, recipient)` into an
//! announce-ready payload carrying the transaction hash it will have on the
//! ledger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use stride_core::{Address, MosaicId, TxHash};

use crate::error::{Error, Result};

/// A signed, announce-ready transaction payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload {
    /// Hash the transaction will carry on the ledger.
    pub tx_hash: TxHash,
    /// Opaque serialized payload for announcement.
    pub payload: String,
}

/// Opaque signer capability.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs a mosaic transfer to `recipient`.
    async fn sign(
        &self,
        mosaic_id: &MosaicId,
        amount: u64,
        recipient: &Address,
    ) -> Result<SignedPayload>;
}

/// Deterministic fake signer for tests and local development.
///
/// Derives the transaction hash from the transfer parameters so repeated
/// signing of the same transfer is reproducible. Can be scripted to fail.
#[derive(Debug, Default)]
pub struct StaticSigner {
    fail: std::sync::atomic::AtomicBool,
}

impl StaticSigner {
    /// Creates a new fake signer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `sign` calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl Signer for StaticSigner {
    async fn sign(
        &self,
        mosaic_id: &MosaicId,
        amount: u64,
        recipient: &Address,
    ) -> Result<SignedPayload> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Signing {
                message: "signer unavailable".into(),
            });
        }

        let tx_hash = TxHash::new(format!("SIG-{mosaic_id}-{amount}-{recipient}"));
        Ok(SignedPayload {
            payload: format!("payload:{tx_hash}"),
            tx_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_signer_is_deterministic() -> Result<()> {
        let signer = StaticSigner::new();
        let mosaic = MosaicId::new("boost.5");
        let recipient = Address::new("TADDR");

        let a = signer.sign(&mosaic, 10, &recipient).await?;
        let b = signer.sign(&mosaic, 10, &recipient).await?;
        assert_eq!(a, b);

        Ok(())
    }

    #[tokio::test]
    async fn static_signer_failure_injection() {
        let signer = StaticSigner::new();
        signer.set_failing(true);

        let result = signer
            .sign(&MosaicId::new("boost.5"), 10, &Address::new("TADDR"))
            .await;
        assert!(matches!(result, Err(Error::Signing { .. })));
    }
}
