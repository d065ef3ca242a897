//! Single-host reverse proxy
//!
//! Forwards an incoming request to one fixed upstream origin and streams the
//! upstream response back to the caller without buffering it.  Used by the
//! edge server in `gostream-core` for the control API, HLS and HTTP-FLV routes.

use std::net::SocketAddr;

use axum::{
    body::{Body, HttpBody},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use url::Url;

/// Headers that only describe a single transport hop and are never forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid upstream URL '{url}': {source}")]
    InvalidUpstream {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Upstream {upstream} unavailable: {source}")]
    UpstreamUnavailable {
        upstream: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build proxied response: {0}")]
    Response(#[from] axum::http::Error),
}

impl ProxyError {
    /// Whether the failure is the transient "upstream not listening yet" case.
    #[must_use]
    pub const fn is_upstream_unavailable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        StatusCode::BAD_GATEWAY.into_response()
    }
}

/// A fixed upstream origin plus the client used to reach it.
#[derive(Debug, Clone)]
pub struct Upstream {
    origin: Url,
    client: reqwest::Client,
}

impl Upstream {
    pub fn new(origin: &str, client: reqwest::Client) -> Result<Self, ProxyError> {
        let origin = Url::parse(origin).map_err(|source| ProxyError::InvalidUpstream {
            url: origin.to_string(),
            source,
        })?;
        Ok(Self { origin, client })
    }

    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Join the request path onto the origin path, keeping the request query.
    #[must_use]
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.origin.clone();
        let base = self.origin.path().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        url.set_path(&format!("{base}/{path}"));
        url.set_query(query);
        url
    }

    /// Forward `req` upstream and stream the answer back.
    ///
    /// Method, headers (minus hop-by-hop ones) and body are preserved.  The
    /// caller's address, when known, is appended to `X-Forwarded-For`.
    pub async fn forward(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();
        let target = self.target_url(parts.uri.path(), parts.uri.query());

        let mut headers = forwardable_headers(&parts.headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        if let Some(host) = parts.headers.get(header::HOST) {
            headers.insert(HeaderName::from_static(X_FORWARDED_HOST), host.clone());
        }
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut headers, addr);
        }

        let mut request = self
            .client
            .request(parts.method, target.clone())
            .headers(headers);
        if body.size_hint().exact() != Some(0) {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        tracing::debug!(target = %target, "Forwarding request upstream");

        let upstream = request
            .send()
            .await
            .map_err(|source| ProxyError::UpstreamUnavailable {
                upstream: self.origin.to_string(),
                source,
            })?;

        let mut builder = Response::builder().status(upstream.status());
        if let Some(response_headers) = builder.headers_mut() {
            *response_headers = forwardable_headers(upstream.headers());
        }

        Ok(builder.body(Body::from_stream(upstream.bytes_stream()))?)
    }
}

fn forwardable_headers(source: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers
        .get(X_FORWARDED_FOR)
        .and_then(|prior| prior.to_str().ok())
    {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}
