//! # Host Bridge Traits
//!
//! Capability contracts between the assistant core and the host it runs in.
//!
//! The core never talks to the network, the OS keychain or the user's browser
//! directly. It consumes the traits below, and a host crate (`bridge-desktop`
//! for terminals and desktops) supplies the implementations. Tests substitute
//! in-memory stubs without touching any other component.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Single-shot async HTTP exchange; retry and
//!   timeout policy live in `core-async::resilience`, not here
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain, Secret Service, Credential Manager)
//! - [`UrlLauncher`](launcher::UrlLauncher) - Hand a URL to the user's browser
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! A missing capability is reported when the service is assembled, not at the
//! first call that needs it:
//!
//! ```ignore
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client provided. Enable the `desktop-shims` feature \
//!                   or inject a host adapter.".to_string(),
//!     })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared
//! between the session manager, its refresh timer and outbound callers.

pub mod error;
pub mod http;
pub mod launcher;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use launcher::UrlLauncher;
pub use storage::SecureStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
