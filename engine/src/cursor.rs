//! Download cursor: turns declared search parameters into request URLs.
//!
//! The cursor owns two FIFO queues. The work queue holds one item per
//! declared resource type, in declaration order. The continuation queue holds
//! `next` links absorbed from paged responses of the type currently being
//! drained; it always takes priority, so every page of a type is requested
//! before the next type starts.

use crate::{Result, ResourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Search parameters for one resource type, kept in sorted key order.
pub type SearchParams = BTreeMap<String, String>;

/// Sort parameter name.
pub const SORT_KEY: &str = "_sort";
/// Last-modified parameter name, also the default sort value.
pub const LAST_UPDATED_KEY: &str = "_lastUpdated";
/// Page size parameter name.
pub const COUNT_KEY: &str = "_count";
/// Comparison prefix for the "modified strictly after" filter.
pub const GREATER_THAN_PREFIX: &str = "gt";

/// Read access to the per-type sync watermarks.
#[async_trait]
pub trait DownloadContext: Send + Sync {
    /// Latest `lastUpdated` already synchronized for `resource_type`.
    async fn latest_timestamp_for(&self, resource_type: &str) -> Result<Option<String>>;
}

#[async_trait]
impl DownloadContext for BTreeMap<ResourceType, String> {
    async fn latest_timestamp_for(&self, resource_type: &str) -> Result<Option<String>> {
        Ok(self.get(resource_type).cloned())
    }
}

/// One declared unit of download work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub resource_type: ResourceType,
    pub params: SearchParams,
}

/// Pagination state of one download pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCursor {
    work: VecDeque<WorkItem>,
    continuations: VecDeque<String>,
    page_size: Option<u32>,
}

impl DownloadCursor {
    /// Create a cursor over `(resource type, params)` pairs, traversed in order.
    pub fn new<I, T>(work: I) -> Self
    where
        I: IntoIterator<Item = (T, SearchParams)>,
        T: Into<ResourceType>,
    {
        Self {
            work: work
                .into_iter()
                .map(|(resource_type, params)| WorkItem {
                    resource_type: resource_type.into(),
                    params,
                })
                .collect(),
            continuations: VecDeque::new(),
            page_size: None,
        }
    }

    /// Inject `_count` into every initial query that does not set it.
    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    /// Queue a continuation URL for the type currently being drained.
    pub fn push_continuation(&mut self, url: impl Into<String>) {
        self.continuations.push_back(url.into());
    }

    /// Whether no more URLs will be produced.
    pub fn is_exhausted(&self) -> bool {
        self.work.is_empty() && self.continuations.is_empty()
    }

    /// Number of resource types not yet started.
    pub fn remaining_types(&self) -> usize {
        self.work.len()
    }

    /// Produce the next URL to request, or `None` when the pass is complete.
    pub async fn next_request_url<C>(&mut self, ctx: &C) -> Result<Option<String>>
    where
        C: DownloadContext + ?Sized,
    {
        if let Some(url) = self.continuations.pop_front() {
            return Ok(Some(url));
        }

        let Some(WorkItem {
            resource_type,
            mut params,
        }) = self.work.pop_front()
        else {
            return Ok(None);
        };

        if !params.contains_key(SORT_KEY) {
            params.insert(SORT_KEY.to_string(), LAST_UPDATED_KEY.to_string());
        }

        if !params.contains_key(LAST_UPDATED_KEY) {
            match ctx.latest_timestamp_for(&resource_type).await? {
                Some(watermark) if !watermark.is_empty() => {
                    params.insert(
                        LAST_UPDATED_KEY.to_string(),
                        format!("{GREATER_THAN_PREFIX}{watermark}"),
                    );
                }
                _ => {}
            }
        }

        if let Some(page_size) = self.page_size {
            params
                .entry(COUNT_KEY.to_string())
                .or_insert_with(|| page_size.to_string());
        }

        Ok(Some(build_url(&resource_type, &params)))
    }
}

/// Encode `<type>?<k1>=<v1>&<k2>=<v2>...`; values are percent-encoded.
pub fn build_url(resource_type: &str, params: &SearchParams) -> String {
    if params.is_empty() {
        return resource_type.to_string();
    }
    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{resource_type}?{query}")
}
