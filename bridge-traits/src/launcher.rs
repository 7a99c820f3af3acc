//! Browser Launch Abstraction

use async_trait::async_trait;

use crate::error::Result;

/// Opens a URL in the user's default browser.
///
/// The OAuth flow treats a launch failure as recoverable: it prints the URL
/// and keeps waiting, so implementations should fail quickly rather than
/// block.
#[async_trait]
pub trait UrlLauncher: Send + Sync {
    async fn open_url(&self, url: &str) -> Result<()>;
}
