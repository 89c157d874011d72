//! `status` variant handler: status-only responses with an empty body.

use super::{
    build_response, BoundHandler, FieldKind, HandlerError, MockRequest, MockResponse,
    OptionsSchema, ServerContext, VariantHandler,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct StatusHandler;

#[derive(Debug, Clone, Deserialize)]
struct StatusOptions {
    status: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl VariantHandler for StatusHandler {
    fn id(&self) -> &'static str {
        "status"
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new()
            .required("status", FieldKind::Integer)
            .optional("headers", FieldKind::Object)
    }

    fn bind(
        &self,
        options: &Value,
        _context: &ServerContext,
    ) -> Result<Arc<dyn BoundHandler>, HandlerError> {
        self.validate(options)?;
        let options: StatusOptions = serde_json::from_value(options.clone())
            .map_err(|e| HandlerError::InvalidOptions(e.to_string()))?;
        Ok(Arc::new(BoundStatus { options }))
    }
}

struct BoundStatus {
    options: StatusOptions,
}

#[async_trait]
impl BoundHandler for BoundStatus {
    async fn handle(&self, _request: &MockRequest) -> Result<MockResponse, HandlerError> {
        build_response(self.options.status, &self.options.headers, None, "")
    }

    fn preview(&self) -> Option<Value> {
        Some(serde_json::json!({
            "status": self.options.status,
            "headers": self.options.headers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_only() {
        let handler = StatusHandler
            .bind(&serde_json::json!({"status": 204}), &ServerContext::new("."))
            .unwrap();
        let request = MockRequest {
            method: "DELETE".into(),
            path: "/x".into(),
            query: None,
            params: HashMap::new(),
            headers: HashMap::new(),
            body: bytes::Bytes::new(),
        };
        let response = handler.handle(&request).await.unwrap();
        assert_eq!(response.status(), 204);
    }

    #[test]
    fn test_status_is_required() {
        let err = StatusHandler
            .bind(&Value::Null, &ServerContext::new("."))
            .err()
            .unwrap();
        assert!(err.to_string().contains("missing required field 'status'"));
    }
}
