// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FetchError;
use crate::http::{ByteStream, HttpClient};

/// Maximum number of redirect hops before a fetch is abandoned
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Preallocation ceiling for buffered fetches. Content-Length is
/// server-controlled, so it only sizes the initial buffer up to this cap;
/// the buffer grows normally past it.
const MAX_PREALLOC_BYTES: u64 = 8 * 1024 * 1024;

/// A successfully resolved response body, ready to be consumed
pub struct FetchedBody {
    /// Final URL after redirect resolution
    pub url: String,
    /// Content-Length of the final response, if the server sent one
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// Fetch a URL, following redirects up to [`MAX_REDIRECT_HOPS`].
///
/// Returns the streaming body of the final 200 response. Any non-success
/// terminal status fails with `HttpStatus`; a redirect loop or chain longer
/// than the bound fails with `RedirectDepthExceeded`.
pub async fn fetch_stream<C: HttpClient>(
    client: &C,
    url: &str,
) -> Result<FetchedBody, FetchError> {
    let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        source: e,
    })?;

    for depth in 0..=MAX_REDIRECT_HOPS {
        debug!(depth, url = %current, "fetching");

        let response = client
            .get(current.as_str())
            .await
            .map_err(|e| FetchError::RequestFailed {
                url: current.to_string(),
                source: e,
            })?;

        if (300..400).contains(&response.status) {
            let location = response
                .location
                .ok_or_else(|| FetchError::MissingLocation {
                    url: current.to_string(),
                })?;

            // Location may be relative; resolve it against the current URL
            let next = current.join(&location).map_err(|e| FetchError::InvalidUrl {
                url: location.clone(),
                source: e,
            })?;

            info!(depth, from = %current, to = %next, "following redirect");
            current = next;
            continue;
        }

        if response.status != 200 {
            warn!(status = response.status, url = %current, "fetch failed");
            return Err(FetchError::HttpStatus {
                url: current.to_string(),
                status: response.status,
            });
        }

        debug!(depth, url = %current, "fetch resolved");
        return Ok(FetchedBody {
            url: current.to_string(),
            content_length: response.content_length,
            body: response.body,
        });
    }

    Err(FetchError::RedirectDepthExceeded {
        url: url.to_string(),
        max_hops: MAX_REDIRECT_HOPS,
    })
}

/// Fetch a URL and buffer the entire body in memory.
///
/// Intended for feed documents; media downloads should consume
/// [`fetch_stream`] directly to avoid buffering whole files.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FetchError> {
    let fetched = fetch_stream(client, url).await?;

    let prealloc = fetched.content_length.unwrap_or(0).min(MAX_PREALLOC_BYTES);
    let mut buf = Vec::with_capacity(prealloc as usize);
    let mut body = fetched.body;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| FetchError::RequestFailed {
            url: fetched.url.clone(),
            source: e,
        })?;
        buf.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct CannedResponse {
        status: u16,
        location: Option<String>,
        body: Vec<u8>,
        /// Content-Length to advertise instead of the body's real length
        advertised_length: Option<u64>,
    }

    #[derive(Clone)]
    struct MockHttpClient {
        routes: Arc<HashMap<String, CannedResponse>>,
        requests: Arc<AtomicUsize>,
    }

    impl MockHttpClient {
        fn new(routes: Vec<(&str, CannedResponse)>) -> Self {
            Self {
                routes: Arc::new(
                    routes
                        .into_iter()
                        .map(|(url, response)| (url.to_string(), response))
                        .collect(),
                ),
                requests: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.requests.fetch_add(1, Ordering::SeqCst);

            let canned = self.routes.get(url).cloned().unwrap_or(CannedResponse {
                status: 404,
                location: None,
                body: Vec::new(),
                advertised_length: None,
            });

            let data = canned.body.clone();
            let len = canned.advertised_length.unwrap_or(data.len() as u64);
            let body: ByteStream =
                Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));

            Ok(HttpResponse {
                status: canned.status,
                location: canned.location,
                content_length: Some(len),
                body,
            })
        }
    }

    fn ok(body: &[u8]) -> CannedResponse {
        CannedResponse {
            status: 200,
            location: None,
            body: body.to_vec(),
            advertised_length: None,
        }
    }

    fn redirect(to: &str) -> CannedResponse {
        CannedResponse {
            status: 302,
            location: Some(to.to_string()),
            body: Vec::new(),
            advertised_length: None,
        }
    }

    #[tokio::test]
    async fn fetch_returns_body_on_success() {
        let client = MockHttpClient::new(vec![("http://example.com/feed.xml", ok(b"hello"))]);

        let bytes = fetch_bytes(&client, "http://example.com/feed.xml")
            .await
            .unwrap();

        assert_eq!(&bytes[..], b"hello");
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn fetch_follows_redirect_to_final_url() {
        let client = MockHttpClient::new(vec![
            ("http://example.com/a", redirect("http://example.com/b")),
            ("http://example.com/b", ok(b"moved content")),
        ]);

        let fetched = fetch_stream(&client, "http://example.com/a").await.unwrap();

        assert_eq!(fetched.url, "http://example.com/b");
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn fetch_resolves_relative_redirect() {
        let client = MockHttpClient::new(vec![
            ("http://example.com/dir/a", redirect("/other/b.mp3")),
            ("http://example.com/other/b.mp3", ok(b"audio")),
        ]);

        let fetched = fetch_stream(&client, "http://example.com/dir/a")
            .await
            .unwrap();

        assert_eq!(fetched.url, "http://example.com/other/b.mp3");
    }

    #[tokio::test]
    async fn fetch_fails_on_redirect_loop() {
        let client = MockHttpClient::new(vec![
            ("http://example.com/a", redirect("http://example.com/b")),
            ("http://example.com/b", redirect("http://example.com/a")),
        ]);

        let result = fetch_stream(&client, "http://example.com/a").await;

        match result {
            Err(FetchError::RedirectDepthExceeded { max_hops, .. }) => {
                assert_eq!(max_hops, MAX_REDIRECT_HOPS);
            }
            Err(other) => panic!("expected RedirectDepthExceeded, got {other}"),
            Ok(_) => panic!("expected RedirectDepthExceeded, got a resolved body"),
        }
        // initial request plus one per allowed hop
        assert_eq!(client.request_count(), MAX_REDIRECT_HOPS + 1);
    }

    #[tokio::test]
    async fn fetch_fails_on_http_error_status() {
        let client = MockHttpClient::new(vec![]);

        let result = fetch_bytes(&client, "http://example.com/missing").await;

        match result.unwrap_err() {
            FetchError::HttpStatus { status, url } => {
                assert_eq!(status, 404);
                assert_eq!(url, "http://example.com/missing");
            }
            other => panic!("expected HttpStatus, got {other}"),
        }
    }

    #[tokio::test]
    async fn fetch_fails_on_redirect_without_location() {
        let client = MockHttpClient::new(vec![(
            "http://example.com/a",
            CannedResponse {
                status: 301,
                location: None,
                body: Vec::new(),
                advertised_length: None,
            },
        )]);

        let result = fetch_stream(&client, "http://example.com/a").await;
        assert!(matches!(result, Err(FetchError::MissingLocation { .. })));
    }

    #[tokio::test]
    async fn fetch_survives_absurd_content_length() {
        let client = MockHttpClient::new(vec![(
            "http://example.com/liar",
            CannedResponse {
                status: 200,
                location: None,
                body: b"tiny".to_vec(),
                advertised_length: Some(u64::MAX),
            },
        )]);

        let bytes = fetch_bytes(&client, "http://example.com/liar")
            .await
            .unwrap();

        assert_eq!(&bytes[..], b"tiny");
    }

    #[tokio::test]
    async fn fetch_rejects_malformed_url() {
        let client = MockHttpClient::new(vec![]);

        let result = fetch_bytes(&client, "not a url").await;

        assert!(matches!(result.unwrap_err(), FetchError::InvalidUrl { .. }));
        assert_eq!(client.request_count(), 0);
    }
}
