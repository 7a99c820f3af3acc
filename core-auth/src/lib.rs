//! # Authentication Module
//!
//! Session lifecycle management for the assistant's AI-service access.
//!
//! ## Overview
//!
//! This module authenticates the process either with a static API key or
//! with an OAuth 2.0 Authorization Code grant (PKCE S256), persists the
//! resulting credential through the secure store bridge, and keeps OAuth
//! credentials fresh with a background refresh timer.
//!
//! ## Features
//!
//! - API key validation (local shape check, optional remote check)
//! - OAuth 2.0 authorization with PKCE and a loopback callback listener
//! - Refresh-token exchange that tolerates servers which do not rotate
//! - Proactive and on-demand refresh with retry of transient failures only
//! - Lifecycle events: state-changed, logged-in, logged-out,
//!   token-refreshed, error

pub mod api_key;
pub mod callback;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod pkce;
pub mod scheduler;
pub mod token_store;
pub mod types;

pub use callback::{AuthorizationCallback, CallbackParams, LocalCallbackServer, PendingCallback};
pub use error::{AuthError, AuthErrorKind, Result};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use oauth::{AuthorizationRequest, OAuthFlowManager};
pub use pkce::PkceVerifier;
pub use token_store::{StoredCredential, TokenStore};
pub use types::{
    AuthEvent, AuthMethod, AuthOutcome, AuthState, Credential, CredentialSummary, TokenDetails,
};
