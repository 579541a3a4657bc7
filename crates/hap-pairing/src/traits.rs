//! Storage seam for paired controllers.

use async_trait::async_trait;
use hap_core::error::Result;
use hap_core::ClientPermission;

/// A controller that completed pair-setup or was added by an admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub identifier: String,
    /// Ed25519 long-term public key (LTPK).
    pub public_key: [u8; 32],
    pub permission: ClientPermission,
}

impl Pairing {
    pub fn new(identifier: impl Into<String>, public_key: [u8; 32], permission: ClientPermission) -> Self {
        Self {
            identifier: identifier.into(),
            public_key,
            permission,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.permission == ClientPermission::Admin
    }
}

/// Persistence of controller pairings and the bridge's paired flag.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PairingStore: Send + Sync {
    async fn is_paired(&self) -> Result<bool>;

    async fn get(&self, identifier: &str) -> Result<Option<Pairing>>;

    async fn list(&self) -> Result<Vec<Pairing>>;

    /// Insert a pairing or replace the one with the same identifier.
    async fn add(&self, pairing: Pairing) -> Result<()>;

    /// Remove a pairing. Unknown identifiers are not an error.
    async fn remove(&self, identifier: &str) -> Result<()>;

    async fn set_paired(&self, paired: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod mock_store {
        use super::*;

        #[tokio::test]
        async fn mock_get_returns_configured_pairing() {
            let mut mock = MockPairingStore::new();
            let pairing = Pairing::new("controller", [7u8; 32], ClientPermission::Admin);
            let expected = pairing.clone();

            mock.expect_get()
                .returning(move |_| Box::pin({
                    let pairing = pairing.clone();
                    async move { Ok(Some(pairing)) }
                }));

            let result = mock.get("controller").await.unwrap();
            assert_eq!(result, Some(expected));
        }

        #[tokio::test]
        async fn mock_is_paired() {
            let mut mock = MockPairingStore::new();
            mock.expect_is_paired()
                .returning(|| Box::pin(async { Ok(true) }));

            assert!(mock.is_paired().await.unwrap());
        }
    }

    #[test]
    fn admin_flag() {
        assert!(Pairing::new("a", [0; 32], ClientPermission::Admin).is_admin());
        assert!(!Pairing::new("u", [0; 32], ClientPermission::User).is_admin());
    }
}
