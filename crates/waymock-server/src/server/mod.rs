//! HTTP server dispatching requests against the active handler chain.
//!
//! Each request takes one `Arc` snapshot of the chain and completes
//! against it, so a reload mid-request never mixes old and new handlers.

use crate::handlers::{error_body, MockRequest};
use crate::mock::{MatchOutcome, MockEngine};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// The mock HTTP server. Binds eagerly so callers can learn the actual
/// port before serving (tests bind port 0).
pub struct MockServer {
    listener: TcpListener,
    engine: MockEngine,
    /// Server-wide default response delay in milliseconds, used when
    /// neither the variant nor the route configures one.
    default_delay: u64,
}

impl MockServer {
    pub async fn bind(
        addr: SocketAddr,
        engine: MockEngine,
        default_delay: u64,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            engine,
            default_delay,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Mock server listening on http://{}", self.local_addr()?);

        loop {
            let (stream, _) = self.listener.accept().await?;
            let io = TokioIo::new(stream);
            let engine = self.engine.clone();
            let default_delay = self.default_delay;

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let engine = engine.clone();
                    async move { dispatch(req, engine, default_delay).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Mock server connection error: {}", e);
                }
            });
        }
    }
}

/// Handle one request against a consistent chain snapshot.
async fn dispatch(
    req: Request<Incoming>,
    engine: MockEngine,
    default_delay: u64,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let method = parts.method.as_str().to_string();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);

    let mut headers = HashMap::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let body = body.collect().await?.to_bytes();

    // One snapshot per request: either the fully-old or fully-new chain.
    let chain = engine.chain();
    debug!(%method, %path, generation = chain.generation(), "dispatching request");

    let response = match chain.match_request(&method, &path) {
        MatchOutcome::Variant {
            entry,
            variant,
            params,
        } => {
            let delay = variant
                .delay
                .or(entry.delay)
                .unwrap_or(default_delay);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let request = MockRequest {
                method,
                path,
                query,
                params,
                headers,
                body,
            };
            match variant.handler.handle(&request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(
                        route = %entry.route_id,
                        variant = %variant.variant_id,
                        "handler failed: {e}"
                    );
                    status_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            }
        }
        MatchOutcome::NoVariant(entry) => {
            debug!(route = %entry.route_id, "route has no active variant");
            status_response(
                StatusCode::NOT_FOUND,
                &format!("Route '{}' has no active variant", entry.route_id),
            )
        }
        MatchOutcome::NotFound => status_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn status_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(error_body(message))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
