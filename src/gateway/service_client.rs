// ============================================================================
// Service Client
// ============================================================================
//
// Reverse proxy to backend services.
// Handles:
// - Request forwarding (method, path, query, headers, buffered body)
// - Streaming the backend response back unchanged
// - Rewriting redirects that would leak a backend address
// - Mapping transport failures and timeouts to 503
//
// Redirects are never followed; one attempt per request.
//
// ============================================================================

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response};
use http_body_util::LengthLimitError;
use reqwest::Url;
use std::error::Error as StdError;
use std::time::Duration;

use super::routes::RouteTarget;
use crate::config::MAX_PROXY_BODY_SIZE;
use crate::error::{AppError, AppResult};
use crate::utils::origin_of;

/// Connection-scoped headers that must not be forwarded in either direction
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP client for forwarding requests to backend services
pub struct ServiceClient {
    client: reqwest::Client,
    public_url: Url,
}

impl ServiceClient {
    pub fn new(timeout_secs: u64, public_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let public_url = Url::parse(public_url)
            .map_err(|e| anyhow::anyhow!("Invalid GATEWAY_PUBLIC_URL '{}': {}", public_url, e))?;

        Ok(Self { client, public_url })
    }

    /// Forward `request` to the backend behind `target`, using the already
    /// normalized `path` in place of the one on the request URI
    pub async fn forward_request(
        &self,
        target: &RouteTarget,
        path: &str,
        request: Request<Body>,
    ) -> AppResult<Response<Body>> {
        let (parts, body) = request.into_parts();

        let target_url = match parts.uri.query() {
            Some(query) => format!("{}{}?{}", target.base_url(), path, query),
            None => format!("{}{}", target.base_url(), path),
        };

        let declared_length = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_length.is_some_and(|len| len > MAX_PROXY_BODY_SIZE) {
            return Err(AppError::PayloadTooLarge {
                limit: MAX_PROXY_BODY_SIZE,
            });
        }

        let body_bytes = buffer_body(body, MAX_PROXY_BODY_SIZE).await?;

        let mut upstream = self.client.request(parts.method.clone(), &target_url);

        // Host is derived from the target URL by the client
        let skipped = connection_tokens(&parts.headers);
        for (key, value) in parts.headers.iter() {
            if key == header::HOST || key == header::CONTENT_LENGTH || is_hop_by_hop(key, &skipped) {
                continue;
            }
            upstream = upstream.header(key, value);
        }

        if !body_bytes.is_empty() {
            upstream = upstream.body(body_bytes);
        }

        let response = upstream.send().await.map_err(|e| {
            tracing::error!(
                error = %e,
                service = %target.service,
                target_url = %target_url,
                timeout = e.is_timeout(),
                "Failed to forward request to service"
            );
            AppError::upstream(format!("{}: {}", target.service, e))
        })?;

        let status = response.status();
        let mut builder = Response::builder().status(status);

        let skipped = connection_tokens(response.headers());
        for (key, value) in response.headers().iter() {
            if is_hop_by_hop(key, &skipped) {
                continue;
            }
            if key == header::LOCATION && status.is_redirection() {
                let rewritten = rewrite_location(value, &target.backend, &self.public_url);
                builder = builder.header(key, rewritten);
                continue;
            }
            builder = builder.header(key, value);
        }

        builder
            .body(Body::from_stream(response.bytes_stream()))
            .map_err(|e| AppError::internal(format!("Failed to build response: {}", e)))
    }
}

/// Header names listed in a `Connection` header, lowercased
/// Buffer a request body of at most `limit` bytes.
///
/// Only exceeding the limit is a 413; a body that fails mid-stream is a 400.
async fn buffer_body(body: Body, limit: usize) -> AppResult<Bytes> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::debug!(error = %e, "Failed to buffer request body");
        if is_length_limit(&e) {
            AppError::PayloadTooLarge { limit }
        } else {
            AppError::validation("malformed request body")
        }
    })
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName, connection_tokens: &[String]) -> bool {
    let name = name.as_str();
    HOP_BY_HOP.contains(&name) || connection_tokens.iter().any(|token| token == name)
}

/// Point a backend redirect at the gateway instead of the backend.
///
/// Only absolute locations whose scheme, host and port equal the backend's
/// are rewritten; relative and foreign locations pass through.
pub fn rewrite_location(location: &HeaderValue, backend: &Url, public: &Url) -> HeaderValue {
    let Some(parsed) = location.to_str().ok().and_then(|v| Url::parse(v).ok()) else {
        return location.clone();
    };

    if origin_of(&parsed).is_none() || origin_of(&parsed) != origin_of(backend) {
        return location.clone();
    }

    let mut rewritten = public.clone();
    rewritten.set_path(parsed.path());
    rewritten.set_query(parsed.query());
    rewritten.set_fragment(parsed.fragment());

    tracing::debug!(from = %parsed, to = %rewritten, "Rewrote backend redirect");

    HeaderValue::from_str(rewritten.as_str()).unwrap_or_else(|_| location.clone())
}
