//! Workspace façade crate.
//!
//! Exposes the feature flags that map onto the workspace crates so host
//! applications can depend on `assistant-workspace` alone. With the default
//! `desktop-shims` feature the desktop bridges are compiled in.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
