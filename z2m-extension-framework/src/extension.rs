//! The extension lifecycle contract.

use async_trait::async_trait;

use crate::error::Result;

/// An extension attached to the host.
///
/// `start` subscribes to the host event bus and acquires resources; `stop`
/// releases them. Once `stop` returns, no bus callback of the extension runs
/// again. Implementations should be restartable.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Short name used in logs and status reports.
    fn name(&self) -> &str;

    async fn start(&mut self) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;
}
