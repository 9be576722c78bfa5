//! HTTP passthrough to the gateway's primary port

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use std::net::Ipv4Addr;
use tracing::{debug, warn};
use url::Url;

use super::ProxyBridge;
use crate::error::{Error, Result};

/// Header carrying the gateway token upstream
pub const AUTH_HEADER: &str = "x-auth-token";

/// Connection-scoped headers, never forwarded in either direction
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client headers that belong to this host, not to the gateway
const CLIENT_ONLY: &[&str] = &["host", "cookie", "authorization", "content-length", AUTH_HEADER];

impl ProxyBridge {
    /// Forward one request to the gateway and stream its response back
    pub async fn serve_http(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<Response> {
        let token = self.running_token()?;
        let url = self.upstream_url(path, query)?;

        let limit = self.config.max_body_bytes;
        let body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| Error::MessageTooLarge(limit))?;

        let mut upstream_headers = request_headers(headers);
        let token = HeaderValue::from_str(&token)
            .map_err(|e| Error::Internal(format!("gateway token is not a header value: {}", e)))?;
        upstream_headers.insert(HeaderName::from_static(AUTH_HEADER), token);

        debug!(%method, path = url.path(), "Proxying gateway request");

        let response = self
            .client
            .request(method, url)
            .headers(upstream_headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    warn!("Gateway request failed: {}", e);
                    Error::UpstreamUnavailable(e.to_string())
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        let headers = response_headers(response.headers());

        let mut out = Response::new(Body::from_stream(response.bytes_stream()));
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }

    fn upstream_url(&self, path: &str, query: Option<&str>) -> Result<Url> {
        let port = self.controller.settings().port;
        let mut url = Url::parse(&format!("http://{}:{}/", Ipv4Addr::LOCALHOST, port))
            .map_err(|e| Error::Internal(format!("upstream url: {}", e)))?;
        url.set_path(path);
        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url)
    }
}

/// Headers named in `Connection` are hop-by-hop too
fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

fn filtered(headers: &HeaderMap, drop: &[&str]) -> HeaderMap {
    let listed = connection_listed(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str)
            || drop.contains(&name_str)
            || listed.iter().any(|l| l == name_str)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn request_headers(headers: &HeaderMap) -> HeaderMap {
    filtered(headers, CLIENT_ONLY)
}

fn response_headers(headers: &HeaderMap) -> HeaderMap {
    filtered(headers, &[AUTH_HEADER])
}
