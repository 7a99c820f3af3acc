//! Secure Credential Storage
//!
//! Persists the session's single credential record through the
//! [`SecureStore`] bridge (Keychain, Secret Service, Credential Manager, or
//! an in-memory map in tests).
//!
//! ## Security Features
//!
//! - Token values are never logged or included in error messages
//! - A record that fails to deserialize is deleted rather than reused
//! - `clear` only touches keys owned by this store
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{AuthMethod, Credential, TokenStore};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let store = TokenStore::new(secure_store);
//!
//! let credential = Credential::api_key("sk-ant-REDACTED");
//! store.save("default", &credential, AuthMethod::ApiKey).await?;
//!
//! let record = store.get("default").await?;
//! assert!(record.is_some());
//!
//! store.delete("default").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{AuthMethod, Credential};
use bridge_traits::storage::SecureStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "auth.credential.";

/// A persisted credential together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub credential: Credential,
    pub method: AuthMethod,
}

/// Credential persistence keyed by logical account.
///
/// Every write replaces the whole record, so a concurrent `get` sees
/// either the previous credential or the new one. Only the session manager
/// talks to this type.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        debug!("Initializing TokenStore");
        Self { secure_store }
    }

    /// Stores `credential` for `account`, replacing any previous record.
    pub async fn save(&self, account: &str, credential: &Credential, method: AuthMethod) -> Result<()> {
        let key = storage_key(account);
        let record = StoredCredential {
            credential: credential.clone(),
            method,
        };

        let json = serde_json::to_vec(&record).map_err(|e| {
            warn!(account, error = %e, "Failed to serialize credential");
            AuthError::SecureStorageUnavailable(format!("credential serialization: {e}"))
        })?;

        self.secure_store
            .set_secret(&key, &json)
            .await
            .map_err(|e| {
                warn!(account, error = %e, "Failed to store credential in secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            account,
            method = %method,
            refreshable = credential.is_refreshable(),
            "Credential stored securely"
        );
        Ok(())
    }

    /// Loads the record for `account`.
    ///
    /// Returns `Ok(None)` when nothing is stored. A corrupted record is
    /// deleted and reported as [`AuthError::TokenCorrupted`].
    pub async fn get(&self, account: &str) -> Result<Option<StoredCredential>> {
        let key = storage_key(account);

        let data = self.secure_store.get_secret(&key).await.map_err(|e| {
            warn!(account, error = %e, "Failed to read credential from secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(account, "No stored credential");
            return Ok(None);
        };

        match serde_json::from_slice::<StoredCredential>(&data) {
            Ok(record) => {
                debug!(
                    account,
                    method = %record.method,
                    expires_at = record.credential.expires_at,
                    "Credential loaded"
                );
                Ok(Some(record))
            }
            Err(e) => {
                warn!(account, error = %e, "Stored credential is corrupted; deleting it");
                if let Err(delete_err) = self.secure_store.delete_secret(&key).await {
                    warn!(account, error = %delete_err, "Failed to delete corrupted credential");
                }
                Err(AuthError::TokenCorrupted {
                    account: account.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Removes the record for `account`. Deleting a missing record succeeds.
    pub async fn delete(&self, account: &str) -> Result<()> {
        self.secure_store
            .delete_secret(&storage_key(account))
            .await
            .map_err(|e| {
                warn!(account, error = %e, "Failed to delete credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;
        info!(account, "Credential deleted");
        Ok(())
    }

    /// Removes every credential record this store owns.
    pub async fn clear(&self) -> Result<()> {
        let keys = self.secure_store.list_keys().await.map_err(|e| {
            warn!(error = %e, "Failed to list keys in secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let mut removed = 0usize;
        for key in keys.iter().filter(|key| key.starts_with(KEY_PREFIX)) {
            self.secure_store
                .delete_secret(key)
                .await
                .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;
            removed += 1;
        }

        info!(removed, "Cleared stored credentials");
        Ok(())
    }

    /// Accounts that currently have a stored record.
    pub async fn accounts(&self) -> Result<Vec<String>> {
        let keys = self
            .secure_store
            .list_keys()
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }
}

fn storage_key(account: &str) -> String {
    format!("{KEY_PREFIX}{account}")
}
