//! Paging downloader: drives a cursor against a remote source.
//!
//! The downloader is one ready-made fetch collaborator for
//! [`Synchronizer::download_and_apply`](crate::Synchronizer::download_and_apply).
//! It requests one page at a time and only asks for the next page when the
//! consumer polls for the next batch, so a batch is committed before the
//! following request is made.

use crate::digest::digest;
use crate::{DownloadContext, DownloadCursor, Error, Record, Result, SyncConfig};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::sync::Arc;

/// Something that can answer a request URL with a JSON response body.
///
/// Transport and authentication live behind this trait.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value>;
}

#[async_trait]
impl<T> RemoteSource for Arc<T>
where
    T: RemoteSource + ?Sized,
{
    async fn fetch(&self, url: &str) -> Result<Value> {
        (**self).fetch(url).await
    }
}

/// Turns a [`DownloadCursor`] and a [`RemoteSource`] into record batches.
#[derive(Debug)]
pub struct Downloader<T> {
    source: T,
    cursor: DownloadCursor,
    pages_per_batch: usize,
}

impl<T: RemoteSource> Downloader<T> {
    /// One page per batch, cursor used as given.
    pub fn new(source: T, cursor: DownloadCursor) -> Self {
        Self {
            source,
            cursor,
            pages_per_batch: 1,
        }
    }

    /// Apply page size and batching from `config`.
    pub fn with_config(source: T, cursor: DownloadCursor, config: &SyncConfig) -> Self {
        Self {
            source,
            cursor: cursor.with_page_size(config.page_size),
            pages_per_batch: config.pages_per_batch.max(1),
        }
    }

    pub fn with_pages_per_batch(mut self, pages: usize) -> Self {
        self.pages_per_batch = pages.max(1);
        self
    }

    /// Current pagination state.
    pub fn cursor(&self) -> &DownloadCursor {
        &self.cursor
    }

    /// Fetch up to `pages_per_batch` pages and return their records.
    ///
    /// Returns `None` once the cursor is exhausted. A page that digests to
    /// an error fails the whole batch.
    pub async fn next_batch<C>(&mut self, ctx: &C) -> Result<Option<Vec<Record>>>
    where
        C: DownloadContext + ?Sized,
    {
        let mut batch = Vec::new();
        let mut pages = 0;

        while pages < self.pages_per_batch {
            let Some(url) = self.cursor.next_request_url(ctx).await? else {
                break;
            };
            tracing::debug!(%url, "fetching page");
            let response = self.source.fetch(&url).await?;
            let records = digest(response, &mut self.cursor)?;
            tracing::debug!(%url, records = records.len(), "page digested");
            batch.extend(records);
            pages += 1;
        }

        Ok((pages > 0).then_some(batch))
    }

    /// Consume the downloader as a lazy stream of batches.
    pub fn into_stream<C>(self, ctx: C) -> impl Stream<Item = Result<Vec<Record>>>
    where
        C: DownloadContext,
    {
        stream::try_unfold((self, ctx), |(mut downloader, ctx)| async move {
            let batch = downloader.next_batch(&ctx).await?;
            Ok::<_, Error>(batch.map(|records| (records, (downloader, ctx))))
        })
    }
}
