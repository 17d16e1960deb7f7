//! Fetching a tarball once, consuming it twice.
//!
//! The response body is forked at the byte level: a small task pulls chunks
//! off the HTTP stream and pushes each one into two bounded channels. One
//! channel feeds the in-memory entry search handed back to the caller, the
//! other feeds extraction into the cache. Both consumers are synchronous
//! (`tar` and `flate2` only speak `Read`) so each runs on a blocking worker,
//! reading its channel through a [`SyncIoBridge`].
//!
//! ```text
//!                      ┌─ channel ─▶ gunzip? ─▶ tar ─▶ search_tarball ─▶ SearchResult
//! HTTP body ─▶ fork ───┤
//!                      └─ channel ─▶ gunzip? ─▶ tar ─▶ unpack ─▶ {cache}/{name}/{name}-{version}/package
//! ```
//!
//! A branch whose receiver goes away (finished early, failed, or simply
//! dropped) is detached; the fork keeps feeding whichever branch remains. The
//! bounded channels mean the faster branch waits for the slower one rather
//! than buffering the whole tarball.

use crate::client::RegistryClient;
use crate::error::{ErrorKind, Result};
use crate::models::PackageDescriptor;
use bytes::Bytes;
use exn::ResultExt;
use futures::channel::mpsc::{self, Receiver, Sender};
use futures::future::join_all;
use futures::{SinkExt, Stream, StreamExt};
use pkgcdn_archive::{SearchResult, search_tarball};
use pkgcdn_storage::{CacheLayout, UnpackSummary, unpack};
use reqwest::StatusCode;
use std::io;
use tokio::task::JoinHandle;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::instrument;

type Chunk = io::Result<Bytes>;
type BranchReader = SyncIoBridge<StreamReader<Receiver<Chunk>, Bytes>>;

/// Downloads tarballs and extracts them into the cache as a side effect.
#[derive(Debug, Clone)]
pub struct TarballFetcher {
    client: RegistryClient,
    layout: CacheLayout,
    buffer: usize,
}

impl TarballFetcher {
    /// `buffer` is the capacity, in chunks, of each branch of the fork.
    pub fn new(client: RegistryClient, layout: CacheLayout, buffer: usize) -> Self {
        Self { client, layout, buffer: buffer.max(1) }
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Start downloading `descriptor`'s tarball.
    ///
    /// Returns once the response headers have arrived. Extraction into the
    /// cache starts immediately and carries on even if the returned stream is
    /// dropped; only a non-200 response or a transport failure before the
    /// body fails this call.
    #[instrument(skip(self, descriptor), fields(name = %descriptor.name, version = %descriptor.version))]
    pub async fn fetch_tarball(&self, descriptor: &PackageDescriptor) -> Result<TarballStream> {
        tracing::debug!(url = %descriptor.tarball, "fetching tarball");
        let response = self
            .client
            .http_for(&descriptor.tarball)
            .get(descriptor.tarball.clone())
            .send()
            .await
            .or_raise(|| ErrorKind::Network)?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            exn::bail!(ErrorKind::Fetch { status: status.as_u16(), body });
        }

        let (memory_tx, memory_rx) = mpsc::channel(self.buffer);
        let (disk_tx, disk_rx) = mpsc::channel(self.buffer);
        tokio::spawn(fork(response.bytes_stream(), vec![memory_tx, disk_tx]));

        let extraction = self.extract(descriptor, bridge(disk_rx));
        Ok(TarballStream {
            descriptor: descriptor.clone(),
            entries: EntryReader { reader: bridge(memory_rx) },
            extraction,
        })
    }

    fn extract(&self, descriptor: &PackageDescriptor, reader: BranchReader) -> Extraction {
        let layout = self.layout.clone();
        let name = descriptor.name.clone();
        let version = descriptor.version.clone();
        let span = tracing::Span::current();
        let handle = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let result = layout
                .content_dir(&name, &version)
                .and_then(|content_dir| unpack(reader, &content_dir))
                .or_raise(|| ErrorKind::CacheWrite);
            match &result {
                Ok(summary) => tracing::debug!(files = summary.files, bytes = summary.bytes, "tarball cached"),
                Err(err) => tracing::error!(error = ?err, "caching tarball failed"),
            }
            result
        });
        Extraction { handle }
    }
}

fn bridge(receiver: Receiver<Chunk>) -> BranchReader {
    SyncIoBridge::new(StreamReader::new(receiver))
}

/// Copy every chunk of `body` into each branch, dropping branches whose
/// receiver has gone away. A body error is forwarded to every branch still
/// attached, which then fails its own read.
async fn fork<S>(body: S, mut branches: Vec<Sender<Chunk>>)
where
    S: Stream<Item = reqwest::Result<Bytes>>,
{
    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "tarball body failed mid-stream");
                let message = err.to_string();
                for branch in branches.iter_mut() {
                    let _ = branch.send(Err(io::Error::other(message.clone()))).await;
                }
                return;
            },
        };
        let sent = join_all(branches.iter_mut().map(|branch| branch.send(Ok(bytes.clone())))).await;
        let mut sent = sent.into_iter();
        branches.retain(|_| sent.next().is_some_and(|result| result.is_ok()));
        if branches.is_empty() {
            tracing::debug!("every branch detached, abandoning tarball body");
            return;
        }
    }
}

/// A tarball being downloaded: the in-memory half and the on-disk half.
///
/// The in-memory branch can only be searched or dropped. Either way it is
/// gone before the caller gets hold of the [`Extraction`], so nothing can
/// sit on an unread branch while waiting for the cache to fill.
#[derive(Debug)]
pub struct TarballStream {
    descriptor: PackageDescriptor,
    entries: EntryReader,
    extraction: Extraction,
}

impl TarballStream {
    pub fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }

    /// Run the entry search over the whole tarball on a blocking worker,
    /// then hand back the extraction still in progress.
    ///
    /// If the search fails, extraction carries on detached.
    #[instrument(skip(self), fields(name = %self.descriptor.name, version = %self.descriptor.version))]
    pub async fn search(self, requested: &str, wants_index: bool) -> Result<(SearchResult, Extraction)> {
        let Self { entries, extraction, .. } = self;
        let result = entries.search(requested, wants_index).await?;
        Ok((result, extraction))
    }

    /// Abandon the in-memory branch; only extraction into the cache remains.
    pub fn into_extraction(self) -> Extraction {
        let Self { entries, extraction, .. } = self;
        drop(entries);
        extraction
    }
}

/// The in-memory branch of a tarball download. Dropping it detaches it
/// from the fork.
struct EntryReader {
    reader: BranchReader,
}

impl std::fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader").finish_non_exhaustive()
    }
}

impl EntryReader {
    async fn search(self, requested: &str, wants_index: bool) -> Result<SearchResult> {
        let Self { reader } = self;
        let requested = requested.to_string();
        tokio::task::spawn_blocking(move || search_tarball(reader, &requested, wants_index))
            .await
            .or_raise(|| ErrorKind::Stream)?
            .or_raise(|| ErrorKind::Stream)
    }
}

/// Handle on the cache-extraction side effect of a tarball download.
#[derive(Debug)]
pub struct Extraction {
    handle: JoinHandle<Result<UnpackSummary>>,
}

impl Extraction {
    /// Wait for extraction to finish. Failures have already been logged.
    pub async fn wait(self) -> Result<UnpackSummary> {
        self.handle.await.or_raise(|| ErrorKind::CacheWrite)?
    }
}
