//! Secure Credential Storage using OS Keychain

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use core_async::sync::Mutex;
use keyring::Entry;
use tracing::{debug, error, warn};

const DEFAULT_SERVICE_NAME: &str = "assistant-cli";

/// Entry holding the JSON list of keys written through this store. The OS
/// keychains offer no portable enumeration, so the store keeps its own.
const INDEX_KEY: &str = "__index__";

/// Keyring-based secure storage implementation
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// Each `set_secret` overwrites the keychain item in one call, so readers
/// see either the previous or the new value.
pub struct KeyringSecureStore {
    service_name: String,
    index_lock: Mutex<()>,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            index_lock: Mutex::new(()),
        }
    }

    fn get_entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        match e {
            keyring::Error::NoStorageAccess(inner) => {
                BridgeError::NotAvailable(format!("Keychain not accessible: {}", inner))
            }
            keyring::Error::PlatformFailure(inner) => {
                BridgeError::NotAvailable(format!("Keychain platform failure: {}", inner))
            }
            other => BridgeError::OperationFailed(format!("Keyring error: {}", other)),
        }
    }

    fn read_raw(&self, key: &str) -> Result<Option<String>> {
        match self.get_entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        match self.get_entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    fn read_index(&self) -> Result<Vec<String>> {
        match self.read_raw(INDEX_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Keychain index unreadable; starting a new one");
                Vec::new()
            })),
            None => Ok(Vec::new()),
        }
    }

    fn write_index(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return self.remove_raw(INDEX_KEY);
        }
        let raw = serde_json::to_string(keys)
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to encode index: {}", e)))?;
        self.get_entry(INDEX_KEY)?
            .set_password(&raw)
            .map_err(Self::map_keyring_error)
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        if key == INDEX_KEY {
            return Err(BridgeError::OperationFailed(format!(
                "'{}' is reserved",
                INDEX_KEY
            )));
        }

        // Keyring only supports strings, so binary data is base64 encoded.
        let encoded = STANDARD.encode(value);
        self.get_entry(key)?
            .set_password(&encoded)
            .map_err(Self::map_keyring_error)?;

        let _guard = self.index_lock.lock().await;
        let mut keys = self.read_index()?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            self.write_index(&keys)?;
        }

        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.read_raw(key)? {
            Some(encoded) => {
                let decoded = STANDARD.decode(&encoded).map_err(|e| {
                    error!(key = key, error = %e, "Failed to decode secret");
                    BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
                })?;
                Ok(Some(decoded))
            }
            None => {
                debug!(key = key, "Secret not found in keyring");
                Ok(None)
            }
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.remove_raw(key)?;

        let _guard = self.index_lock.lock().await;
        let mut keys = self.read_index()?;
        let before = keys.len();
        keys.retain(|k| k != key);
        if keys.len() != before {
            self.write_index(&keys)?;
        }

        debug!(key = key, "Deleted secret from keyring");
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let _guard = self.index_lock.lock().await;
        self.read_index()
    }

    async fn clear_all(&self) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let keys = self.read_index()?;
        for key in &keys {
            self.remove_raw(key)?;
        }
        self.remove_raw(INDEX_KEY)?;
        debug!(count = keys.len(), "Cleared keyring secrets");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_names() {
        assert_eq!(KeyringSecureStore::new().service_name, "assistant-cli");
        assert_eq!(
            KeyringSecureStore::with_service_name("test-service").service_name,
            "test-service"
        );
    }

    #[tokio::test]
    async fn test_index_key_is_reserved() {
        let store = KeyringSecureStore::with_service_name("assistant-cli-test");
        assert!(store.set_secret(INDEX_KEY, b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_round_trip_when_keychain_available() {
        // Headless CI machines usually have no keychain; skip quietly there.
        let store = KeyringSecureStore::with_service_name("assistant-cli-test");
        let key = "auth.credential.keyring-test";

        if let Err(e) = store.set_secret(key, b"{\"v\":1}").await {
            println!("Keyring not available ({}), skipping test", e);
            return;
        }

        // A second handle must see the write: entries are backed by the OS
        // keychain, not by the handle that wrote them.
        let reader = KeyringSecureStore::with_service_name("assistant-cli-test");
        assert_eq!(
            reader.get_secret(key).await.unwrap(),
            Some(b"{\"v\":1}".to_vec())
        );
        assert!(reader.list_keys().await.unwrap().contains(&key.to_string()));

        store.delete_secret(key).await.unwrap();
        assert_eq!(reader.get_secret(key).await.unwrap(), None);
        assert!(!store.list_keys().await.unwrap().contains(&key.to_string()));
    }
}
