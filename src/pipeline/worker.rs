use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::DownloadError;
use crate::fetch::fetch_stream;
use crate::http::HttpClient;

use super::{DownloadRequest, PipelineContext};

/// Outcome of one claimed download request
pub(crate) enum DownloadOutcome {
    Downloaded(u64),
    Skipped,
    Cancelled,
}

/// Drain the shared queue until it is closed or the run is cancelled.
///
/// The pool shares a single receiver behind a mutex; queue semantics
/// guarantee each request is claimed by exactly one worker.
pub(crate) async fn run_worker<C: HttpClient>(
    client: C,
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DownloadRequest>>>,
    ctx: Arc<PipelineContext>,
) {
    loop {
        // Hold the receiver lock only while waiting for one request, so the
        // rest of the pool keeps draining while this worker downloads.
        let request = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                request = rx.recv() => request,
            }
        };

        let Some(request) = request else { break };

        match execute_request(&client, &ctx.dest_root, &request, &ctx.cancel).await {
            Ok(DownloadOutcome::Downloaded(bytes)) => {
                info!(
                    worker = worker_id,
                    folder = %request.folder,
                    file = %request.filename,
                    bytes,
                    "downloaded"
                );
                ctx.counters.downloaded.fetch_add(1, Ordering::SeqCst);
            }
            Ok(DownloadOutcome::Cancelled) => {
                debug!(
                    worker = worker_id,
                    folder = %request.folder,
                    file = %request.filename,
                    "run cancelled, request abandoned"
                );
                break;
            }
            Ok(DownloadOutcome::Skipped) => {
                debug!(
                    worker = worker_id,
                    folder = %request.folder,
                    file = %request.filename,
                    "already present, skipped"
                );
                ctx.counters.skipped.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!(
                    worker = worker_id,
                    folder = %request.folder,
                    file = %request.filename,
                    error = %e,
                    "download failed"
                );
                ctx.counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    debug!(worker = worker_id, "worker exiting");
}

/// Execute a single download request.
///
/// The destination file only ever appears complete: the body streams into a
/// `.partial` sibling which is renamed into place after a full write, and
/// removed on any failure.
pub(crate) async fn execute_request<C: HttpClient>(
    client: &C,
    dest_root: &Path,
    request: &DownloadRequest,
    cancel: &CancellationToken,
) -> Result<DownloadOutcome, DownloadError> {
    let folder = dest_root.join(&request.folder);
    if let Err(e) = tokio::fs::create_dir_all(&folder).await {
        // The write below fails on its own if the folder is truly unusable
        warn!(path = %folder.display(), error = %e, "could not create folder");
    }

    let dest = folder.join(&request.filename);
    if matches!(tokio::fs::try_exists(&dest).await, Ok(true)) {
        return Ok(DownloadOutcome::Skipped);
    }

    // A request claimed just before shutdown must not start a fetch
    if cancel.is_cancelled() {
        return Ok(DownloadOutcome::Cancelled);
    }

    let fetched = fetch_stream(client, &request.source_url).await?;

    let partial = folder.join(format!("{}.partial", request.filename));
    let bytes_written = match write_body(fetched.body, &fetched.url, &partial).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&partial, &dest).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(DownloadError::RenameFailed {
            from: partial,
            source: e,
        });
    }

    Ok(DownloadOutcome::Downloaded(bytes_written))
}

async fn write_body(
    mut body: crate::http::ByteStream,
    url: &str,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = body.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        bytes_written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_written)
}
