//! `file` variant handler: serve the contents of one on-disk file.
//!
//! The file is read at request time, so edits to the backing file show up
//! without a reload. A missing or unreadable file is a handler runtime
//! failure (the route answers 5xx), not a resolution failure.

use super::{
    build_response, BoundHandler, FieldKind, HandlerError, MockRequest, MockResponse,
    OptionsSchema, ServerContext, VariantHandler,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct FileHandler;

#[derive(Debug, Clone, Deserialize)]
struct FileOptions {
    path: String,
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
}

fn default_status() -> u16 {
    200
}

impl VariantHandler for FileHandler {
    fn id(&self) -> &'static str {
        "file"
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new()
            .required("path", FieldKind::String)
            .optional("status", FieldKind::Integer)
            .optional("headers", FieldKind::Object)
    }

    fn bind(
        &self,
        options: &Value,
        context: &ServerContext,
    ) -> Result<Arc<dyn BoundHandler>, HandlerError> {
        self.validate(options)?;
        let options: FileOptions = serde_json::from_value(options.clone())
            .map_err(|e| HandlerError::InvalidOptions(e.to_string()))?;
        let resolved = context.base_dir.join(&options.path);
        Ok(Arc::new(BoundFile { options, resolved }))
    }
}

struct BoundFile {
    options: FileOptions,
    resolved: PathBuf,
}

#[async_trait]
impl BoundHandler for BoundFile {
    async fn handle(&self, _request: &MockRequest) -> Result<MockResponse, HandlerError> {
        let contents = tokio::fs::read(&self.resolved).await?;
        build_response(
            self.options.status,
            &self.options.headers,
            Some(content_type_for(&self.resolved)),
            contents,
        )
    }

    fn preview(&self) -> Option<Value> {
        Some(serde_json::json!({
            "status": self.options.status,
            "path": self.options.path,
        }))
    }
}

/// Content type from the file extension. Unknown extensions fall back to
/// octet-stream.
pub(crate) fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request() -> MockRequest {
        MockRequest {
            method: "GET".into(),
            path: "/".into(),
            query: None,
            params: HashMap::new(),
            headers: HashMap::new(),
            body: bytes::Bytes::new(),
        }
    }

    #[tokio::test]
    async fn test_serves_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("payload.json")).unwrap();
        file.write_all(br#"{"ok": true}"#).unwrap();

        let handler = FileHandler
            .bind(
                &serde_json::json!({"path": "payload.json"}),
                &ServerContext::new(dir.path()),
            )
            .unwrap();
        let response = handler.handle(&request()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_a_runtime_error() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler
            .bind(
                &serde_json::json!({"path": "gone.txt"}),
                &ServerContext::new(dir.path()),
            )
            .unwrap();
        assert!(handler.handle(&request()).await.is_err());
    }

    #[test]
    fn test_content_type_table() {
        assert_eq!(content_type_for(Path::new("a/b.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("x.png")), "image/png");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }
}
