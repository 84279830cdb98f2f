use std::path::PathBuf;
use thiserror::Error;

/// Errors from the redirect-following content fetcher
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Request failed for {url}: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Redirect from {url} carries no usable Location header")]
    MissingLocation { url: String },

    #[error("Redirect chain exceeded {max_hops} hops starting from {url}")]
    RedirectDepthExceeded { url: String, max_hops: usize },
}

/// Errors that make an entire feed unusable
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed: {0}")]
    FetchFailed(#[from] FetchError),

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),
}

/// Errors that abort a single download request
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to move {from} into place: {source}")]
    RenameFailed {
        from: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
