//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for terminals and desktops
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest` (single attempt, no internal retry)
//! - `SecureStore` using the `keyring` crate, with a key index so the store
//!   can be listed and cleared
//! - `MemorySecureStore` for tests and ephemeral sessions
//! - `UrlLauncher` using the `open` crate
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{KeyringSecureStore, ReqwestHttpClient, SystemBrowserLauncher};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let store = KeyringSecureStore::new();
//! let launcher = SystemBrowserLauncher;
//! ```

mod http;
mod launcher;
mod memory_store;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use http::ReqwestHttpClient;
pub use launcher::SystemBrowserLauncher;
pub use memory_store::MemorySecureStore;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
