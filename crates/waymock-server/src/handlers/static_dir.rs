//! `static` variant handler: directory serving with its own sub-routing.
//!
//! Unlike plain responders, this handler routes below the route's mount
//! path: the route url must capture the remainder (`/web/*`), and the
//! captured tail is resolved against the configured directory. Missing
//! files answer 404 themselves rather than failing the route.

use super::{
    build_response, error_body, BoundHandler, FieldKind, HandlerError, HandlerKind, MockRequest,
    MockResponse, OptionsSchema, ServerContext, VariantHandler, SUBPATH_PARAM,
};
use crate::handlers::file::content_type_for;
use async_trait::async_trait;
use http_body_util::Full;
use hyper::Response;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub struct StaticHandler;

#[derive(Debug, Clone, Deserialize)]
struct StaticOptions {
    path: String,
    /// Serve `index.html` for directory requests.
    #[serde(default = "default_index")]
    index: bool,
    #[serde(default)]
    headers: HashMap<String, String>,
}

fn default_index() -> bool {
    true
}

impl VariantHandler for StaticHandler {
    fn id(&self) -> &'static str {
        "static"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Router
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new()
            .required("path", FieldKind::String)
            .optional("index", FieldKind::Boolean)
            .optional("headers", FieldKind::Object)
    }

    fn bind(
        &self,
        options: &Value,
        context: &ServerContext,
    ) -> Result<Arc<dyn BoundHandler>, HandlerError> {
        self.validate(options)?;
        let options: StaticOptions = serde_json::from_value(options.clone())
            .map_err(|e| HandlerError::InvalidOptions(e.to_string()))?;
        let root = context.base_dir.join(&options.path);
        Ok(Arc::new(BoundStatic { options, root }))
    }
}

struct BoundStatic {
    options: StaticOptions,
    root: PathBuf,
}

impl BoundStatic {
    /// Resolve the captured sub-path, rejecting traversal outside the root.
    fn resolve(&self, subpath: &str) -> Option<PathBuf> {
        let relative = Path::new(subpath.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return None,
            }
        }
        Some(self.root.join(relative))
    }

    fn not_found(&self) -> MockResponse {
        Response::builder()
            .status(404)
            .header("content-type", "application/json")
            .body(error_body("Not Found"))
            .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new())))
    }
}

#[async_trait]
impl BoundHandler for BoundStatic {
    async fn handle(&self, request: &MockRequest) -> Result<MockResponse, HandlerError> {
        let subpath = request
            .params
            .get(SUBPATH_PARAM)
            .map(String::as_str)
            .unwrap_or("");

        let Some(mut target) = self.resolve(subpath) else {
            return Ok(self.not_found());
        };

        match tokio::fs::metadata(&target).await {
            Ok(metadata) if metadata.is_dir() && self.options.index => {
                target = target.join("index.html");
            }
            Ok(metadata) if metadata.is_dir() => return Ok(self.not_found()),
            Ok(_) => {}
            Err(_) => return Ok(self.not_found()),
        }

        match tokio::fs::read(&target).await {
            Ok(contents) => build_response(
                200,
                &self.options.headers,
                Some(content_type_for(&target)),
                contents,
            ),
            Err(_) => Ok(self.not_found()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_subpath(subpath: &str) -> MockRequest {
        let mut params = HashMap::new();
        params.insert(SUBPATH_PARAM.to_string(), subpath.to_string());
        MockRequest {
            method: "GET".into(),
            path: format!("/web/{subpath}"),
            query: None,
            params,
            headers: HashMap::new(),
            body: bytes::Bytes::new(),
        }
    }

    fn bind_dir(dir: &Path) -> Arc<dyn BoundHandler> {
        StaticHandler
            .bind(
                &serde_json::json!({"path": "."}),
                &ServerContext::new(dir),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_files_and_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("app.css"), "body {}").unwrap();

        let handler = bind_dir(dir.path());

        let response = handler.handle(&request_with_subpath("app.css")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/css"));

        // Directory request falls back to index.html.
        let response = handler.handle(&request_with_subpath("")).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_missing_file_is_404_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let handler = bind_dir(dir.path());
        let response = handler.handle(&request_with_subpath("nope.js")).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let handler = bind_dir(dir.path());
        let response = handler
            .handle(&request_with_subpath("../outside.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }
}
