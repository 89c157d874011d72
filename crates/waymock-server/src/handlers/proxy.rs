//! `proxy` variant handler: forward the request to an upstream host.
//!
//! This is a leaf response strategy, not a general reverse proxy: one
//! upstream per variant, path and query forwarded as-is, hop-by-hop
//! headers stripped on the way back. Upstream failures answer 502 for this
//! route only.

use super::{
    error_body, BoundHandler, FieldKind, HandlerError, MockRequest, MockResponse, OptionsSchema,
    ServerContext, VariantHandler,
};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

pub struct ProxyHandler;

#[derive(Debug, Clone, Deserialize)]
struct ProxyOptions {
    /// Upstream base url, e.g. `http://127.0.0.1:3100`.
    host: String,
    /// Extra headers injected into the forwarded request.
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl VariantHandler for ProxyHandler {
    fn id(&self) -> &'static str {
        "proxy"
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new()
            .required("host", FieldKind::String)
            .optional("headers", FieldKind::Object)
    }

    fn bind(
        &self,
        options: &Value,
        _context: &ServerContext,
    ) -> Result<Arc<dyn BoundHandler>, HandlerError> {
        self.validate(options)?;
        let options: ProxyOptions = serde_json::from_value(options.clone())
            .map_err(|e| HandlerError::InvalidOptions(e.to_string()))?;
        let host = options.host.trim_end_matches('/').to_string();
        if !host.starts_with("http://") && !host.starts_with("https://") {
            return Err(HandlerError::InvalidOptions(format!(
                "field 'host' must be an http(s) url, got '{}'",
                options.host
            )));
        }
        Ok(Arc::new(BoundProxy {
            host,
            inject_headers: options.headers,
        }))
    }
}

struct BoundProxy {
    host: String,
    inject_headers: HashMap<String, String>,
}

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

impl BoundProxy {
    fn upstream_url(&self, request: &MockRequest) -> String {
        match &request.query {
            Some(query) => format!("{}{}?{}", self.host, request.path, query),
            None => format!("{}{}", self.host, request.path),
        }
    }

    fn bad_gateway(&self, detail: &str) -> MockResponse {
        warn!(upstream = %self.host, "proxy variant upstream failure: {detail}");
        Response::builder()
            .status(502)
            .header("content-type", "application/json")
            .body(error_body("Bad Gateway"))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
    }
}

#[async_trait]
impl BoundHandler for BoundProxy {
    async fn handle(&self, request: &MockRequest) -> Result<MockResponse, HandlerError> {
        let method = match reqwest::Method::from_str(&request.method) {
            Ok(m) => m,
            Err(_) => return Ok(self.bad_gateway("unsupported method")),
        };

        let mut upstream = ServerContext::http_client()
            .request(method, self.upstream_url(request))
            .body(request.body.clone());

        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                upstream = upstream.header(name.as_str(), value.as_str());
            }
        }
        for (name, value) in &self.inject_headers {
            upstream = upstream.header(name.as_str(), value.as_str());
        }

        let upstream_response = match upstream.send().await {
            Ok(response) => response,
            Err(e) => return Ok(self.bad_gateway(&e.to_string())),
        };

        let status = upstream_response.status().as_u16();
        let mut builder = Response::builder().status(status);
        for (name, value) in upstream_response.headers() {
            if !is_hop_by_hop(name.as_str()) {
                builder = builder.header(name, value);
            }
        }

        let body = match upstream_response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(self.bad_gateway(&e.to_string())),
        };

        builder
            .body(Full::new(body))
            .map_err(|e| HandlerError::Response(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_must_be_a_url() {
        let err = ProxyHandler
            .bind(
                &serde_json::json!({"host": "localhost:3000"}),
                &ServerContext::new("."),
            )
            .err()
            .unwrap();
        assert!(err.to_string().contains("must be an http(s) url"));
    }

    #[test]
    fn test_upstream_url_preserves_path_and_query() {
        let handler = BoundProxy {
            host: "http://upstream:9000".into(),
            inject_headers: HashMap::new(),
        };
        let request = MockRequest {
            method: "GET".into(),
            path: "/users/3".into(),
            query: Some("full=true".into()),
            params: HashMap::new(),
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        assert_eq!(
            handler.upstream_url(&request),
            "http://upstream:9000/users/3?full=true"
        );
    }

    #[test]
    fn test_hop_by_hop_headers_are_stripped() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("x-request-id"));
    }
}
