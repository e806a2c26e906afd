//! Single, timed fetch of the upstream subscription document. No retries.

use crate::errors::UpstreamError;
use crate::headers::{SubHeaders, parse_sub_headers};
use crate::metrics_defs::{UPSTREAM_FETCH_DURATION, UPSTREAM_FETCH_FAILURES};
use async_trait::async_trait;
use http::header::{CACHE_CONTROL, USER_AGENT};
use shared::{counter, histogram};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamResponse {
    pub content: String,
    pub headers: SubHeaders,
}

#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// GETs `url` on behalf of the client identified by `user_agent`.
    async fn fetch(&self, url: &str, user_agent: Option<&str>) -> Result<UpstreamResponse, UpstreamError>;
}

/// Cursory shape check: the first non-blank line must look like `key: value`.
pub fn looks_like_yaml(content: &str) -> bool {
    content
        .trim()
        .split('\n')
        .next()
        .is_some_and(|line| line.contains(':'))
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        HttpFetcher {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        user_agent: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut request = self.client.get(url).header(CACHE_CONTROL, "no-cache");
        if let Some(ua) = user_agent {
            request = request.header(USER_AGENT, ua);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        let headers = parse_sub_headers(response.headers());
        let content = response.text().await?;
        if !looks_like_yaml(&content) {
            return Err(UpstreamError::NotYaml);
        }

        tracing::info!(length = content.len(), "fetched subscription content");
        Ok(UpstreamResponse { content, headers })
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, user_agent: Option<&str>) -> Result<UpstreamResponse, UpstreamError> {
        let started = Instant::now();

        // The bound covers connect, headers and the full body.
        let result = match tokio::time::timeout(self.timeout, self.fetch_once(url, user_agent)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        };

        let status = if result.is_ok() { "ok" } else { "error" };
        histogram!(UPSTREAM_FETCH_DURATION, "status" => status).record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            let reason = match e {
                UpstreamError::Request(_) => "request",
                UpstreamError::Status(_) => "status",
                UpstreamError::Timeout(_) => "timeout",
                UpstreamError::NotYaml => "not_yaml",
            };
            counter!(UPSTREAM_FETCH_FAILURES, "reason" => reason).increment(1);
            tracing::warn!(error = %e, "upstream fetch failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{spawn_server, text_response};
    use hyper::StatusCode;

    #[test]
    fn test_yaml_shape_check() {
        assert!(looks_like_yaml("\n\n  proxies:\n  - a"));
        assert!(looks_like_yaml("mixed-port: 7890"));
        assert!(!looks_like_yaml("<html><body>blocked</body></html>"));
        assert!(!looks_like_yaml(""));
        assert!(!looks_like_yaml("c3M6Ly9ZV1Z6TFRJMU5pMW5ZMjA2\nproxies: []"));
    }

    #[tokio::test]
    async fn test_fetch_forwards_headers() {
        let addr = spawn_server(|req| async move {
            let ua = req
                .headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let cache = req
                .headers()
                .get("cache-control")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let mut res = text_response(StatusCode::OK, format!("ua: {ua}\ncache: {cache}\n"));
            res.headers_mut()
                .insert("profile-update-interval", "12".parse().unwrap());
            res
        })
        .await;

        let fetcher = HttpFetcher::new(DEFAULT_TIMEOUT);
        let response = fetcher
            .fetch(&format!("http://{addr}/sub"), Some("Stash/2.4"))
            .await
            .unwrap();

        assert_eq!(response.content, "ua: Stash/2.4\ncache: no-cache\n");
        assert_eq!(response.headers.profile_update_interval_hour, Some(12));
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let addr = spawn_server(|_| async { text_response(StatusCode::FORBIDDEN, "key: denied") }).await;
        let err = HttpFetcher::new(DEFAULT_TIMEOUT)
            .fetch(&format!("http://{addr}/"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Status(StatusCode::FORBIDDEN)));
    }

    #[tokio::test]
    async fn test_non_yaml_body() {
        let addr = spawn_server(|_| async { text_response(StatusCode::OK, "<html></html>") }).await;
        let err = HttpFetcher::new(DEFAULT_TIMEOUT)
            .fetch(&format!("http://{addr}/"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NotYaml));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let addr = spawn_server(|_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            text_response(StatusCode::OK, "proxies: []")
        })
        .await;

        let started = Instant::now();
        let err = HttpFetcher::new(Duration::from_millis(200))
            .fetch(&format!("http://{addr}/"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpFetcher::new(DEFAULT_TIMEOUT)
            .fetch(&format!("http://{addr}/"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Request(_)));
    }
}
