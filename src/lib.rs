pub mod error;
pub mod feed;
pub mod fetch;
pub mod http;
pub mod naming;
pub mod pipeline;

// Re-export main types for convenience
pub use error::{DownloadError, FeedError, FetchError};
pub use feed::{Channel, Enclosure, Episode, Feed, ParseWarning, parse_feed};
pub use fetch::{FetchedBody, MAX_REDIRECT_HOPS, fetch_bytes, fetch_stream};
pub use http::{ByteStream, HttpClient, HttpResponse, ReqwestClient};
pub use pipeline::{DownloadRequest, PipelineOptions, PipelineReport, run_pipeline};
