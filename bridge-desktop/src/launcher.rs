//! Browser launcher using the `open` crate

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    launcher::UrlLauncher,
};
use tracing::debug;

/// Opens URLs with the platform handler (`open`, `xdg-open`, `start`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowserLauncher;

#[async_trait]
impl UrlLauncher for SystemBrowserLauncher {
    async fn open_url(&self, url: &str) -> Result<()> {
        open::that_detached(url).map_err(|e| {
            BridgeError::NotAvailable(format!("Could not launch a browser: {}", e))
        })?;
        debug!("Launched system browser");
        Ok(())
    }
}
