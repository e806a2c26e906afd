use crate::GatewayError;
use crate::metrics_defs::{REJECTED_CLIENTS, REQUEST_DURATION, REQUESTS_INFLIGHT};
use crate::routes::{DirectQuery, DirectQueryError, Route};
use converter::variant::is_supported_client;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use shared::http::{make_boxed_error_response, make_text_response};
use shared::{counter, gauge, histogram};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::KvStore;
use subscription::{Renderer, SubHeaders, SubscriptionCache, SubscriptionError, UpstreamFetcher};

pub const TEXT_YAML: &str = "text/yaml; charset=utf-8";

/// Label used by the direct route when upstream does not name its file.
pub const DEFAULT_LABEL: &str = "Clash-Config-Sub";

const UNSUPPORTED_CLIENT: &str = "Not supported, must request inside clash app";

/// RFC 5987 attr-char minus a few rarely safe symbols.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub type GatewayResponse = Response<BoxBody<Bytes, Infallible>>;

struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}

pub struct Gateway {
    cache: SubscriptionCache,
    fetcher: Arc<dyn UpstreamFetcher>,
    renderer: Renderer,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
        renderer: Renderer,
        cache_ttl: Duration,
    ) -> Self {
        Gateway {
            cache: SubscriptionCache::new(store, fetcher.clone(), cache_ttl),
            fetcher,
            renderer,
        }
    }

    pub async fn handle(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> GatewayResponse {
        let _inflight = InflightGuard::new();
        let started = Instant::now();
        let route = Route::from_path(uri.path());

        let response = self.dispatch(&route, method, uri, headers).await;

        histogram!(
            REQUEST_DURATION,
            "route" => route.name(),
            "status" => response.status().as_u16().to_string()
        )
        .record(started.elapsed().as_secs_f64());
        response
    }

    async fn dispatch(
        &self,
        route: &Route<'_>,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> GatewayResponse {
        if method != Method::GET && method != Method::HEAD {
            return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }
        if *route == Route::NotFound {
            return make_boxed_error_response(StatusCode::NOT_FOUND);
        }

        let user_agent = headers
            .get(USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
            .filter(|ua| !ua.is_empty());
        let user_agent = user_agent.as_deref();

        if !is_supported_client(user_agent) {
            counter!(REJECTED_CLIENTS).increment(1);
            tracing::info!(user_agent, "blocked request from unsupported client");
            return make_text_response(StatusCode::BAD_REQUEST, UNSUPPORTED_CLIENT);
        }

        match route {
            Route::Direct => self.direct(uri.query(), user_agent).await,
            Route::Token(token) => self.token(token, user_agent).await,
            Route::NotFound => make_boxed_error_response(StatusCode::NOT_FOUND),
        }
    }

    async fn direct(&self, query: Option<&str>, user_agent: Option<&str>) -> GatewayResponse {
        let query = match DirectQuery::parse(query) {
            Ok(query) => query,
            Err(DirectQueryError::MissingSub) => {
                return make_text_response(StatusCode::BAD_REQUEST, "sub is required");
            }
            Err(DirectQueryError::InvalidSub) => {
                return make_text_response(StatusCode::BAD_REQUEST, "sub must be a base64 encoded url");
            }
        };

        match self.fetch_direct(&query, user_agent).await {
            Ok((content, headers)) => yaml_response(content, &headers, None),
            Err(e) => error_response(&e),
        }
    }

    async fn fetch_direct(
        &self,
        query: &DirectQuery,
        user_agent: Option<&str>,
    ) -> Result<(String, SubHeaders), SubscriptionError> {
        let upstream = self.fetcher.fetch(&query.upstream_url, user_agent).await?;
        if !query.convert {
            return Ok((upstream.content, upstream.headers));
        }

        let label = upstream.headers.file_name.as_deref().unwrap_or(DEFAULT_LABEL);
        let content = self
            .renderer
            .render(&upstream.content, label, user_agent, None)
            .await?;
        tracing::debug!(label, "converted direct subscription");
        Ok((content, upstream.headers))
    }

    async fn token(&self, token: &str, user_agent: Option<&str>) -> GatewayResponse {
        let served = async {
            let sub = self.cache.get_or_fetch(token, user_agent).await?;
            let content = self
                .renderer
                .render(
                    &sub.artifact.content,
                    &sub.record.label,
                    user_agent,
                    Some(&sub.record.filter),
                )
                .await?;
            Ok::<_, SubscriptionError>((content, sub))
        }
        .await;

        match served {
            Ok((content, sub)) => {
                let disposition = content_disposition(&sub.record.label);
                yaml_response(content, &sub.artifact.headers, disposition)
            }
            Err(e) => error_response(&e),
        }
    }
}

/// `attachment; filename*=UTF-8''<label>` with the label percent-encoded.
pub fn content_disposition(label: &str) -> Option<HeaderValue> {
    let encoded = utf8_percent_encode(label, FILENAME_ENCODE_SET);
    HeaderValue::from_str(&format!("attachment; filename*=UTF-8''{encoded}")).ok()
}

fn yaml_response(
    content: String,
    upstream: &SubHeaders,
    disposition: Option<HeaderValue>,
) -> GatewayResponse {
    let mut response = make_text_response(StatusCode::OK, content);
    let headers = response.headers_mut();

    for (name, value) in &upstream.raw_headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(header = %name, "dropping unrepresentable upstream header"),
        }
    }
    if let Some(disposition) = disposition {
        headers.insert(CONTENT_DISPOSITION, disposition);
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_YAML));

    response
}

fn error_response(err: &SubscriptionError) -> GatewayResponse {
    if err.is_client_fault() {
        tracing::info!(error = %err, "bad request");
        make_text_response(StatusCode::BAD_REQUEST, err.to_string())
    } else if err.is_upstream_fault() {
        tracing::warn!(error = %err, "upstream failure");
        make_text_response(StatusCode::BAD_GATEWAY, err.to_string())
    } else {
        tracing::error!(error = %err, "failed to serve subscription");
        make_text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {err}"),
        )
    }
}

pub struct GatewayService {
    gateway: Arc<Gateway>,
}

impl GatewayService {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        GatewayService { gateway }
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = GatewayResponse;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let gateway = self.gateway.clone();
        Box::pin(async move {
            let (parts, _body) = req.into_parts();
            Ok(gateway.handle(&parts.method, &parts.uri, &parts.headers).await)
        })
    }
}
