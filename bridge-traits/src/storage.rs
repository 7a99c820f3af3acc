//! Secure Storage Abstraction

use async_trait::async_trait;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts platform-specific secure storage:
/// - macOS: Keychain
/// - Linux: Secret Service
/// - Windows: Credential Manager
///
/// # Consistency
///
/// `set_secret` replaces the previous value as a whole. A concurrent
/// `get_secret` observes either the old or the new value, never a partial
/// write.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("auth.credential.default", token.as_bytes()).await
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value for `key`.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist. Returned data must not be
    /// logged.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    /// List all secret keys (without values)
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Delete every secret owned by this store.
    async fn clear_all(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Store {}

        #[async_trait]
        impl SecureStore for Store {
            async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;
            async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;
            async fn delete_secret(&self, key: &str) -> Result<()>;
            async fn list_keys(&self) -> Result<Vec<String>>;
            async fn clear_all(&self) -> Result<()>;
        }
    }

    #[tokio::test]
    async fn test_has_secret_delegates_to_get() {
        let mut store = MockStore::new();
        store
            .expect_get_secret()
            .times(2)
            .returning(|key| Ok(key.starts_with("auth.").then(|| b"{}".to_vec())));

        assert!(store.has_secret("auth.credential.default").await.unwrap());
        assert!(!store.has_secret("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_has_secret_propagates_errors() {
        let mut store = MockStore::new();
        store.expect_get_secret().returning(|_| {
            Err(crate::error::BridgeError::NotAvailable("keychain locked".into()))
        });

        assert!(store.has_secret("auth.credential.default").await.is_err());
    }
}
