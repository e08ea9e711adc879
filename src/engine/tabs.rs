//! Tab platform boundary
//!
//! The browser side of the system is an external collaborator. The engine
//! only needs to list open tabs and to redirect or close one; everything
//! else arrives as events on the engine channel.

use crate::engine::types::TabInfo;
use crate::engine::EngineResult;
use async_trait::async_trait;

/// Operations the engine needs from the hosting browser
#[async_trait]
pub trait TabPlatform: Send + Sync {
    /// List every currently open tab
    async fn list_tabs(&self) -> EngineResult<Vec<TabInfo>>;

    /// Navigate a tab to a new URL
    async fn update_tab(&self, tab_id: i64, url: &str) -> EngineResult<()>;

    /// Close a tab
    async fn close_tab(&self, tab_id: i64) -> EngineResult<()>;
}
