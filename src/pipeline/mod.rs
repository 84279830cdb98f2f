// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod producer;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::http::HttpClient;
use crate::naming::normalize_extension;

/// Options for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Number of concurrent download workers
    pub workers: usize,
    /// Only episodes with this extension are downloaded (".mp3" form)
    pub target_extension: String,
    /// Randomly delay each producer's start to decorrelate feed fetches
    pub stagger: bool,
    /// Write a snapshot of each fetched feed document under the destination
    pub keep_feeds: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            target_extension: normalize_extension("mp3"),
            stagger: true,
            keep_feeds: false,
        }
    }
}

/// Final tally of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Episodes downloaded to disk
    pub downloaded: usize,
    /// Episodes skipped because the destination file already existed
    pub skipped: usize,
    /// Download requests that failed
    pub failed: usize,
    /// Feeds that could not be fetched or parsed at all
    pub feeds_failed: usize,
}

/// One unit of work on the shared queue.
///
/// Ownership moves from the producing task into the queue and on to
/// whichever worker claims it; no request is ever seen by two workers.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub source_url: String,
    pub folder: String,
    pub filename: String,
}

/// Everything the producers and workers of one run share.
///
/// Constructed once per [`run_pipeline`] call; there are no process-wide
/// globals, so multiple pipelines can coexist in one process.
pub(crate) struct PipelineContext {
    pub dest_root: PathBuf,
    pub target_extension: String,
    pub stagger: bool,
    pub keep_feeds: bool,
    pub counters: Counters,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub downloaded: AtomicUsize,
    pub skipped: AtomicUsize,
    pub failed: AtomicUsize,
    pub feeds_failed: AtomicUsize,
}

/// Run the whole pipeline: one producer per feed URL feeding a fixed pool
/// of download workers through a single shared queue.
///
/// Workers are started before any producer so a request can never be
/// enqueued with zero consumers. Shutdown is two-phase: all producers are
/// awaited first, dropping the last queue sender closes the queue, and the
/// workers are awaited once they have drained it. Individual feed or
/// download failures only ever affect their own request; the run always
/// completes.
pub async fn run_pipeline<C: HttpClient + Clone + 'static>(
    client: &C,
    feeds: &[String],
    dest_root: &Path,
    options: &PipelineOptions,
    cancel: CancellationToken,
) -> PipelineReport {
    let ctx = Arc::new(PipelineContext {
        dest_root: dest_root.to_path_buf(),
        target_extension: options.target_extension.clone(),
        stagger: options.stagger,
        keep_feeds: options.keep_feeds,
        counters: Counters::default(),
        cancel,
    });

    if let Err(e) = tokio::fs::create_dir_all(dest_root).await {
        // Workers retry per-folder creation; a missing root just fails there
        tracing::warn!(path = %dest_root.display(), error = %e, "could not create destination root");
    }

    // Capacity 1 keeps the queue a synchronous handoff: a producer's send
    // suspends until a worker is about to take the request.
    let (tx, rx) = mpsc::channel::<DownloadRequest>(1);
    let rx = Arc::new(Mutex::new(rx));

    info!(
        feeds = feeds.len(),
        workers = options.workers,
        extension = %options.target_extension,
        "pipeline starting"
    );

    let mut worker_handles = Vec::with_capacity(options.workers);
    for worker_id in 0..options.workers {
        worker_handles.push(tokio::spawn(worker::run_worker(
            client.clone(),
            worker_id,
            rx.clone(),
            ctx.clone(),
        )));
    }

    let mut producer_handles = Vec::with_capacity(feeds.len());
    for feed_url in feeds {
        producer_handles.push(tokio::spawn(producer::run_producer(
            client.clone(),
            feed_url.clone(),
            tx.clone(),
            ctx.clone(),
        )));
    }

    // The spawned producers hold their own sender clones; dropping ours
    // means the queue closes as soon as the last producer finishes.
    drop(tx);

    for handle in producer_handles {
        let _ = handle.await;
    }
    debug!("all producers finished, queue closing");

    for handle in worker_handles {
        let _ = handle.await;
    }

    let report = PipelineReport {
        downloaded: ctx.counters.downloaded.load(Ordering::SeqCst),
        skipped: ctx.counters.skipped.load(Ordering::SeqCst),
        failed: ctx.counters.failed.load(Ordering::SeqCst),
        feeds_failed: ctx.counters.feeds_failed.load(Ordering::SeqCst),
    };

    info!(
        downloaded = report.downloaded,
        skipped = report.skipped,
        failed = report.failed,
        feeds_failed = report.feeds_failed,
        "pipeline finished"
    );

    report
}
