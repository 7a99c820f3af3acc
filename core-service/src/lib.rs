//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (HTTP, secure storage, browser
//! launcher, clock) into the authentication core and exposes the two things
//! a host needs: the [`SessionManager`] driving login/logout/refresh, and an
//! [`AuthorizedTransport`] for calls to the AI service. Desktop hosts
//! typically enable the `desktop-shims` feature so missing bridges fall back
//! to the `bridge-desktop` implementations.
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let core = CoreService::bootstrap(CoreConfig::builder().build()?).await?;
//! if !core.session().is_authenticated() {
//!     core.session().authenticate(None).await;
//! }
//! core.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod transport;

pub use error::{CoreError, Result};
pub use transport::AuthorizedTransport;

pub use core_auth::{AuthEvent, AuthMethod, AuthOutcome, AuthState, SessionManager, TokenDetails};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::{
    KeyringSecureStore, MemorySecureStore, ReqwestHttpClient, SystemBrowserLauncher,
};

use core_runtime::config::CoreConfig;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    session: SessionManager,
    transport: AuthorizedTransport,
}

impl CoreService {
    /// Assembles the session manager and transport without touching storage.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let CoreConfig {
            auth,
            http_client,
            secure_store,
            url_launcher,
            clock,
        } = config;

        let mut builder = SessionManager::builder(auth)
            .secure_store(secure_store)
            .http_client(http_client.clone())
            .clock(clock);
        if let Some(launcher) = url_launcher {
            builder = builder.url_launcher(launcher);
        }
        let session = builder
            .build()
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

        let transport = AuthorizedTransport::new(session.clone(), http_client);
        Ok(Self { session, transport })
    }

    /// Builds the service and resumes any persisted session.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let service = Self::new(config)?;
        let state = service.session.initialize().await?;
        info!(%state, "Core service ready");
        Ok(service)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn transport(&self) -> &AuthorizedTransport {
        &self.transport
    }

    /// Stops background work (the refresh timer). Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.session.shutdown();
        info!("Core service shut down");
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("session", &self.session)
            .finish()
    }
}
