//! `text` variant handler: fixed plain-text body responses.

use super::{
    build_response, BoundHandler, FieldKind, HandlerError, MockRequest, MockResponse,
    OptionsSchema, ServerContext, VariantHandler,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct TextHandler;

#[derive(Debug, Clone, Deserialize)]
struct TextOptions {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    body: String,
}

fn default_status() -> u16 {
    200
}

impl VariantHandler for TextHandler {
    fn id(&self) -> &'static str {
        "text"
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new()
            .optional("status", FieldKind::Integer)
            .optional("headers", FieldKind::Object)
            .required("body", FieldKind::String)
    }

    fn bind(
        &self,
        options: &Value,
        _context: &ServerContext,
    ) -> Result<Arc<dyn BoundHandler>, HandlerError> {
        self.validate(options)?;
        let options: TextOptions = serde_json::from_value(options.clone())
            .map_err(|e| HandlerError::InvalidOptions(e.to_string()))?;
        Ok(Arc::new(BoundText { options }))
    }
}

struct BoundText {
    options: TextOptions,
}

#[async_trait]
impl BoundHandler for BoundText {
    async fn handle(&self, _request: &MockRequest) -> Result<MockResponse, HandlerError> {
        build_response(
            self.options.status,
            &self.options.headers,
            Some("text/plain; charset=utf-8"),
            self.options.body.clone(),
        )
    }

    fn preview(&self) -> Option<Value> {
        Some(serde_json::json!({
            "status": self.options.status,
            "headers": self.options.headers,
            "body": self.options.body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_must_be_a_string() {
        let err = TextHandler
            .bind(
                &serde_json::json!({"body": {"not": "text"}}),
                &ServerContext::new("."),
            )
            .err()
            .unwrap();
        assert!(err.to_string().contains("field 'body' must be of type string"));
    }

    #[tokio::test]
    async fn test_text_response() {
        let handler = TextHandler
            .bind(
                &serde_json::json!({"body": "hello", "status": 200}),
                &ServerContext::new("."),
            )
            .unwrap();
        let request = MockRequest {
            method: "GET".into(),
            path: "/".into(),
            query: None,
            params: HashMap::new(),
            headers: HashMap::new(),
            body: bytes::Bytes::new(),
        };
        let response = handler.handle(&request).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
