//! `middleware` variant handler: arbitrary programmatic responders.
//!
//! Responders are registered on the [`ServerContext`] by name from code
//! (tests, embedding applications, plugins); the variant's options select
//! one by name. An unregistered name fails at bind time, which the
//! resolver reports as an alert and treats as a disabled variant.

use super::{
    BoundHandler, FieldKind, HandlerError, MockRequest, MockResponse, OptionsSchema,
    ServerContext, VariantHandler,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub type MiddlewareFn = dyn Fn(&MockRequest) -> MockResponse + Send + Sync;

pub struct MiddlewareHandler;

#[derive(Debug, Clone, Deserialize)]
struct MiddlewareOptions {
    name: String,
}

impl VariantHandler for MiddlewareHandler {
    fn id(&self) -> &'static str {
        "middleware"
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new().required("name", FieldKind::String)
    }

    fn bind(
        &self,
        options: &Value,
        context: &ServerContext,
    ) -> Result<Arc<dyn BoundHandler>, HandlerError> {
        self.validate(options)?;
        let options: MiddlewareOptions = serde_json::from_value(options.clone())
            .map_err(|e| HandlerError::InvalidOptions(e.to_string()))?;
        let function = context.middleware(&options.name).ok_or_else(|| {
            HandlerError::InvalidOptions(format!(
                "no middleware registered under name '{}'",
                options.name
            ))
        })?;
        Ok(Arc::new(BoundMiddleware { function }))
    }
}

struct BoundMiddleware {
    function: Arc<MiddlewareFn>,
}

#[async_trait]
impl BoundHandler for BoundMiddleware {
    async fn handle(&self, request: &MockRequest) -> Result<MockResponse, HandlerError> {
        Ok((self.function)(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::build_response;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_dispatches_to_registered_function() {
        let context = ServerContext::new(".");
        context.register_middleware("echo-method", |request: &MockRequest| {
            build_response(200, &HashMap::new(), Some("text/plain"), request.method.clone())
                .unwrap()
        });

        let handler = MiddlewareHandler
            .bind(&serde_json::json!({"name": "echo-method"}), &context)
            .unwrap();
        let request = MockRequest {
            method: "PATCH".into(),
            path: "/".into(),
            query: None,
            params: HashMap::new(),
            headers: HashMap::new(),
            body: bytes::Bytes::new(),
        };
        let response = handler.handle(&request).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[test]
    fn test_unknown_name_fails_at_bind() {
        let err = MiddlewareHandler
            .bind(&serde_json::json!({"name": "ghost"}), &ServerContext::new("."))
            .err()
            .unwrap();
        assert!(err.to_string().contains("no middleware registered"));
    }
}
