//! Variant handler registry and the handler capability contract.
//!
//! A variant names a handler type (`"json"`, `"proxy"`, ...); the registry
//! maps that type id to a strategy exposing an options schema, a `bind`
//! constructor and a request-handling contract. Built-ins are
//! pre-registered and cannot be removed, but a later registration with the
//! same type id shadows them at lookup time.
//!
//! Options are validated when the resolver binds a variant, not at load
//! time, so one bad variant never blocks the rest of a load.

mod file;
mod json;
mod middleware;
mod proxy;
mod status;
mod static_dir;
mod text;

pub use file::FileHandler;
pub use json::JsonHandler;
pub use middleware::{MiddlewareFn, MiddlewareHandler};
pub use proxy::ProxyHandler;
pub use static_dir::StaticHandler;
pub use status::StatusHandler;
pub use text::TextHandler;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Request/response contract
// ============================================================================

/// The request view handed to bound handlers at dispatch time.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Path parameters captured by the route pattern (`:id`, `*`).
    pub params: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl MockRequest {
    /// Decoded query parameters. Later occurrences of a key win.
    pub fn query_params(&self) -> HashMap<String, String> {
        let Some(ref query) = self.query else {
            return HashMap::new();
        };
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let key = parts.next()?;
                let value = parts.next().unwrap_or("");
                Some((
                    urlencoding::decode(key).unwrap_or_default().into_owned(),
                    urlencoding::decode(value).unwrap_or_default().into_owned(),
                ))
            })
            .collect()
    }
}

pub type MockResponse = Response<Full<Bytes>>;

/// Name of the path parameter carrying the captured tail for handlers
/// that sub-route below their mount path (`HandlerKind::Router`).
pub const SUBPATH_PARAM: &str = "rest";

/// Build a response with a status, optional extra headers and a body.
pub fn build_response(
    status: u16,
    headers: &HashMap<String, String>,
    content_type: Option<&str>,
    body: impl Into<Bytes>,
) -> Result<MockResponse, HandlerError> {
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        let has_content_type = headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            builder = builder.header("content-type", content_type);
        }
    }
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Full::new(body.into()))
        .map_err(|e| HandlerError::Response(e.to_string()))
}

/// JSON error payload used for engine-generated responses (404, 5xx).
pub fn error_body(message: &str) -> Full<Bytes> {
    let payload = serde_json::json!({ "error": message });
    Full::new(Bytes::from(payload.to_string()))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("options are invalid: {0}")]
    InvalidOptions(String),
    #[error("unknown handler type '{0}'")]
    UnknownType(String),
    #[error("failed to build response: {0}")]
    Response(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

/// Fatal registry misconfiguration, surfaced at startup only.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler type '{0}' registered twice in the built-in set")]
    DuplicateBuiltin(String),
}

// ============================================================================
// Options schema
// ============================================================================

/// Expected JSON type of an option field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Object,
    /// Any JSON value.
    Any,
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_u64() || value.is_i64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// Declarative validation descriptor for a handler's options payload.
#[derive(Debug, Clone, Default)]
pub struct OptionsSchema {
    fields: Vec<FieldSpec>,
}

impl OptionsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
        });
        self
    }

    /// Check `options` against the schema, collecting every problem.
    pub fn validate(&self, options: &Value) -> Result<(), HandlerError> {
        let mut problems = Vec::new();

        let object = match options {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(HandlerError::InvalidOptions(format!(
                    "expected an object, got {}",
                    json_type_name(other)
                )));
            }
        };

        for field in &self.fields {
            let value = object.and_then(|map| map.get(field.name));
            match value {
                None | Some(Value::Null) => {
                    if field.required {
                        problems.push(format!("missing required field '{}'", field.name));
                    }
                }
                Some(value) if !field.kind.accepts(value) => {
                    problems.push(format!(
                        "field '{}' must be of type {}, got {}",
                        field.name,
                        field.kind.name(),
                        json_type_name(value)
                    ));
                }
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::InvalidOptions(problems.join("; ")))
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Handler capability traits
// ============================================================================

/// Request contract shape: plain responder, or a handler that does its own
/// sub-routing below the route's mount path (static directory serving).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Middleware,
    Router,
}

/// A pluggable strategy implementing how a bound variant answers requests.
pub trait VariantHandler: Send + Sync {
    /// Static type identifier, the registry key.
    fn id(&self) -> &'static str;

    fn kind(&self) -> HandlerKind {
        HandlerKind::Middleware
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new()
    }

    /// Validate `options` without constructing a handler.
    fn validate(&self, options: &Value) -> Result<(), HandlerError> {
        self.options_schema().validate(options)
    }

    /// Construct the per-resolution-pass bound instance. Called once per
    /// resolution, never per request.
    fn bind(
        &self,
        options: &Value,
        context: &ServerContext,
    ) -> Result<Arc<dyn BoundHandler>, HandlerError>;
}

/// A handler instance bound to one variant's options for the lifetime of a
/// resolution pass. I/O (file reads, upstream calls) happens here, at
/// request time, never at bind time.
#[async_trait]
pub trait BoundHandler: Send + Sync {
    async fn handle(&self, request: &MockRequest) -> Result<MockResponse, HandlerError>;

    /// Response shape for introspection, without executing side effects.
    fn preview(&self) -> Option<Value> {
        None
    }
}

// ============================================================================
// Server context
// ============================================================================

/// Shared environment handed to handlers at bind time.
pub struct ServerContext {
    /// Base directory that `file`/`static` options paths resolve against.
    pub base_dir: PathBuf,
    middlewares: RwLock<HashMap<String, Arc<MiddlewareFn>>>,
}

impl ServerContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            middlewares: RwLock::new(HashMap::new()),
        }
    }

    /// Register a named programmatic responder for `middleware` variants.
    pub fn register_middleware(
        &self,
        name: impl Into<String>,
        function: impl Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
    ) {
        self.middlewares
            .write()
            .insert(name.into(), Arc::new(function));
    }

    pub(crate) fn middleware(&self, name: &str) -> Option<Arc<MiddlewareFn>> {
        self.middlewares.read().get(name).cloned()
    }

    /// Shared upstream client for `proxy` variants. Lazily initialized and
    /// reused across resolutions, like any other per-process client.
    pub fn http_client() -> &'static reqwest::Client {
        static CLIENT: once_cell::sync::OnceCell<reqwest::Client> = once_cell::sync::OnceCell::new();
        CLIENT.get_or_init(|| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build upstream HTTP client")
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered list of known handler types. Lookup scans from the most recent
/// registration backwards, so re-registering a type id shadows the earlier
/// entry without removing it.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn VariantHandler>>,
}

impl HandlerRegistry {
    /// Registry pre-loaded with the built-in handler set.
    ///
    /// Duplicate type ids inside the built-in set are a programming error
    /// and abort startup rather than being masked by shadowing.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let builtins: Vec<Arc<dyn VariantHandler>> = vec![
            Arc::new(JsonHandler),
            Arc::new(TextHandler),
            Arc::new(StatusHandler),
            Arc::new(FileHandler),
            Arc::new(StaticHandler),
            Arc::new(MiddlewareHandler),
            Arc::new(ProxyHandler),
        ];

        let mut seen = HashSet::new();
        for handler in &builtins {
            if !seen.insert(handler.id()) {
                return Err(RegistryError::DuplicateBuiltin(handler.id().to_string()));
            }
        }

        Ok(Self { handlers: builtins })
    }

    /// Append custom handler types. Later registrations win at lookup time.
    pub fn register(&mut self, handlers: Vec<Arc<dyn VariantHandler>>) {
        self.handlers.extend(handlers);
    }

    pub fn lookup(&self, type_id: &str) -> Option<&Arc<dyn VariantHandler>> {
        self.handlers.iter().rev().find(|h| h.id() == type_id)
    }

    pub fn type_ids(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.id()).collect()
    }
}
