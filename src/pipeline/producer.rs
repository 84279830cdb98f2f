use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use bytes::Bytes;

use crate::error::FeedError;
use crate::feed::{Feed, parse_feed};
use crate::fetch::fetch_bytes;
use crate::http::HttpClient;
use crate::naming::{episode_filename, folder_name, media_source};

use super::{DownloadRequest, PipelineContext};

/// Fetch and parse one feed document, keeping the raw bytes around for the
/// optional snapshot
async fn load_feed<C: HttpClient>(client: &C, url: &str) -> Result<(Bytes, Feed), FeedError> {
    let bytes = fetch_bytes(client, url).await?;
    let feed = parse_feed(&bytes)?;
    Ok((bytes, feed))
}

/// Random startup delay bounds, to decorrelate the initial feed fetches
const STAGGER_MIN_MS: u64 = 200;
const STAGGER_MAX_MS: u64 = 3200;

/// Process one feed: fetch, parse, derive names, enqueue download requests.
///
/// A failed feed ends only this producer; per-episode problems never abort
/// the remaining episodes of the feed.
pub(crate) async fn run_producer<C: HttpClient>(
    client: C,
    feed_url: String,
    tx: mpsc::Sender<DownloadRequest>,
    ctx: Arc<PipelineContext>,
) {
    if ctx.stagger {
        let millis = rand::thread_rng().gen_range(STAGGER_MIN_MS..STAGGER_MAX_MS);
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(millis)) => {}
        }
    }

    let (bytes, feed) = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return,
        result = load_feed(&client, &feed_url) => match result {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(feed = %feed_url, error = %e, "feed unusable");
                ctx.counters.feeds_failed.fetch_add(1, Ordering::SeqCst);
                return;
            }
        },
    };

    for warning in &feed.warnings {
        warn!(feed = %feed_url, "{warning}");
    }

    let folder = folder_name(&feed.channel.title);

    if ctx.keep_feeds {
        let snapshot = ctx.dest_root.join(format!("{folder}.xml"));
        if let Err(e) = tokio::fs::write(&snapshot, &bytes).await {
            warn!(path = %snapshot.display(), error = %e, "could not write feed snapshot");
        }
    }

    let mut enqueued = 0usize;
    for episode in &feed.episodes {
        let Some(source) = media_source(episode) else {
            continue;
        };
        let Some((filename, ext)) = episode_filename(episode) else {
            continue;
        };
        if ext != ctx.target_extension {
            continue;
        }

        let request = DownloadRequest {
            source_url: source.to_string(),
            folder: folder.clone(),
            filename,
        };

        // Blocking send is the backpressure: it suspends until a worker is
        // ready to take the request.
        let sent = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => false,
            result = tx.send(request) => result.is_ok(),
        };
        if !sent {
            debug!(feed = %feed_url, "queue closed or run cancelled, producer stopping");
            return;
        }
        enqueued += 1;
    }

    info!(
        feed = %feed_url,
        title = %feed.channel.title,
        episodes = feed.episodes.len(),
        enqueued,
        "feed processed"
    );
}
