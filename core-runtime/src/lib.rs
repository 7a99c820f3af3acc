//! # Core Runtime Module
//!
//! Ambient infrastructure shared by every assistant core crate:
//! - Typed configuration (`AuthConfig`, `CoreConfig`) with fail-fast validation
//! - Logging and tracing setup, including token-shape redaction
//! - A synchronous listener registry used for lifecycle notifications
//!
//! Nothing in here knows about credentials or HTTP semantics. `core-auth`
//! builds on these pieces.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AuthConfig, AuthMethod, CoreConfig, OAuthSettings};
pub use error::{Error, Result};
pub use events::{Event, EventBus, SubscriptionId};
