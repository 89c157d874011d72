//! `json` variant handler: fixed JSON body responses.

use super::{
    build_response, BoundHandler, FieldKind, HandlerError, MockRequest, MockResponse,
    OptionsSchema, ServerContext, VariantHandler,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct JsonHandler;

#[derive(Debug, Clone, Deserialize)]
struct JsonOptions {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    body: Value,
}

fn default_status() -> u16 {
    200
}

impl VariantHandler for JsonHandler {
    fn id(&self) -> &'static str {
        "json"
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new()
            .optional("status", FieldKind::Integer)
            .optional("headers", FieldKind::Object)
            .required("body", FieldKind::Any)
    }

    fn bind(
        &self,
        options: &Value,
        _context: &ServerContext,
    ) -> Result<Arc<dyn BoundHandler>, HandlerError> {
        self.validate(options)?;
        let options: JsonOptions = serde_json::from_value(options.clone())
            .map_err(|e| HandlerError::InvalidOptions(e.to_string()))?;
        let body = serde_json::to_string(&options.body)
            .map_err(|e| HandlerError::InvalidOptions(e.to_string()))?;
        Ok(Arc::new(BoundJson { options, body }))
    }
}

struct BoundJson {
    options: JsonOptions,
    /// Serialized once at bind time; requests share the same bytes.
    body: String,
}

#[async_trait]
impl BoundHandler for BoundJson {
    async fn handle(&self, _request: &MockRequest) -> Result<MockResponse, HandlerError> {
        build_response(
            self.options.status,
            &self.options.headers,
            Some("application/json"),
            self.body.clone(),
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

    fn bind(options: Value) -> Result<Arc<dyn BoundHandler>, HandlerError> {
        JsonHandler.bind(&options, &ServerContext::new("."))
    }

    #[tokio::test]
    async fn test_json_response() {
        let handler = bind(serde_json::json!({
            "status": 201,
            "body": {"id": 7}
        }))
        .unwrap();

        let request = MockRequest {
            method: "GET".into(),
            path: "/x".into(),
            query: None,
            params: HashMap::new(),
            headers: HashMap::new(),
            body: bytes::Bytes::new(),
        };
        let response = handler.handle(&request).await.unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_body_is_required() {
        let err = bind(serde_json::json!({"status": 200})).err().unwrap();
        assert!(err.to_string().contains("missing required field 'body'"));
    }

    #[test]
    fn test_preview_describes_response() {
        let handler = bind(serde_json::json!({"body": [1, 2]})).unwrap();
        let preview = handler.preview().unwrap();
        assert_eq!(preview["status"], 200);
        assert_eq!(preview["body"], serde_json::json!([1, 2]));
    }
}
