//! Configuration for download passes.

use serde::{Deserialize, Serialize};

/// Tuning for a download pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// `_count` injected into initial queries that don't set one
    pub page_size: Option<u32>,
    /// Pages bundled into one committed batch
    pub pages_per_batch: usize,
}

impl SyncConfig {
    /// Creates a configuration with server-default paging, one page per batch.
    pub fn new() -> Self {
        Self {
            page_size: None,
            pages_per_batch: 1,
        }
    }

    /// Sets the page size requested from the server.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Sets how many pages make up one batch. Zero is treated as one.
    pub fn with_pages_per_batch(mut self, pages: usize) -> Self {
        self.pages_per_batch = pages.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
