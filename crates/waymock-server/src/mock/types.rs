//! Definition types for routes, variants and collections.
//!
//! These are the records producers push through the loader managers. Loads
//! are full replacements; records are plain values cloned per resolution
//! pass, never mutated in place after loading.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between route id and variant id in external references.
pub const VARIANT_REF_SEPARATOR: char = ':';

/// One mocked endpoint: a method + path pattern exposing one or more
/// response variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    /// Unique within a load. Duplicates raise an alert; last wins.
    pub id: String,
    /// Express-style path pattern: `/users/:id`, `/assets/*`.
    pub url: String,
    #[serde(default)]
    pub method: RouteMethod,
    /// Default response delay in milliseconds for all variants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(default)]
    pub variants: Vec<VariantDefinition>,
}

/// HTTP method matcher for a route: a single method, a list, or `*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteMethod {
    One(String),
    Many(Vec<String>),
}

impl Default for RouteMethod {
    fn default() -> Self {
        RouteMethod::One("*".to_string())
    }
}

impl RouteMethod {
    pub fn matches(&self, method: &str) -> bool {
        match self {
            RouteMethod::One(m) => m == "*" || m.eq_ignore_ascii_case(method),
            RouteMethod::Many(list) => list.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }

    /// Canonical display form ("GET", "GET|POST", "*").
    pub fn display(&self) -> String {
        match self {
            RouteMethod::One(m) => m.to_uppercase(),
            RouteMethod::Many(list) => list
                .iter()
                .map(|m| m.to_uppercase())
                .collect::<Vec<_>>()
                .join("|"),
        }
    }
}

/// One concrete response strategy for a route, bound to a handler type at
/// resolution time. Externally addressed as `routeId:variantId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDefinition {
    /// Unique within its route.
    pub id: String,
    /// Handler registry key ("json", "text", "proxy", ...).
    #[serde(rename = "type")]
    pub handler_type: String,
    /// Handler-specific payload, validated against the handler's schema
    /// when the variant is bound, not at load time.
    #[serde(default)]
    pub options: Value,
    /// Overrides the route delay when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(default)]
    pub disabled: bool,
}

/// A named, optionally inherited selection of route variants — one mock
/// "scenario".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDefinition {
    /// Unique across the load.
    pub id: String,
    /// Parent collection id. The effective set is the parent's effective
    /// set with this collection's entries overlaid per route id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Ordered `routeId:variantId` references. Only this collection's own
    /// entries; inheritance is resolved at resolution time.
    #[serde(default)]
    pub route_variants: Vec<String>,
}

/// Split a `routeId:variantId` reference. Variant ids may not contain the
/// separator; route ids may not either, so the first occurrence splits.
pub fn parse_variant_ref(reference: &str) -> Option<(&str, &str)> {
    let (route, variant) = reference.split_once(VARIANT_REF_SEPARATOR)?;
    if route.is_empty() || variant.is_empty() {
        return None;
    }
    Some((route, variant))
}

/// Join a route id and variant id into an external reference.
pub fn variant_ref(route_id: &str, variant_id: &str) -> String {
    format!("{route_id}{VARIANT_REF_SEPARATOR}{variant_id}")
}

// ============================================================================
// Plain introspection views (consumed by admin front-ends)
// ============================================================================

/// Flattened collection view: declared and fully-resolved route variants.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPlain {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// The collection's own `routeId:variantId` entries.
    pub defined_routes: Vec<String>,
    /// The effective entries after walking the `from` chain.
    pub effective_routes: Vec<String>,
}

/// Flattened variant view with its handler preview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteVariantPlain {
    /// External reference, `routeId:variantId`.
    pub id: String,
    pub route: String,
    #[serde(rename = "type")]
    pub handler_type: String,
    pub disabled: bool,
    /// Response shape preview, `null` when the handler cannot describe its
    /// response without executing it.
    pub preview: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_definition_deserialization() {
        let json = r#"{
            "id": "get-user",
            "url": "/users/:id",
            "method": "GET",
            "variants": [
                {"id": "success", "type": "json", "options": {"status": 200, "body": {"name": "a"}}},
                {"id": "missing", "type": "status", "options": {"status": 404}, "disabled": true}
            ]
        }"#;
        let route: RouteDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(route.id, "get-user");
        assert!(route.method.matches("get"));
        assert!(!route.method.matches("POST"));
        assert_eq!(route.variants.len(), 2);
        assert_eq!(route.variants[0].handler_type, "json");
        assert!(route.variants[1].disabled);
    }

    #[test]
    fn test_method_list_and_wildcard() {
        let json = r#"{"id": "r", "url": "/x", "method": ["get", "POST"]}"#;
        let route: RouteDefinition = serde_json::from_str(json).unwrap();
        assert!(route.method.matches("GET"));
        assert!(route.method.matches("post"));
        assert!(!route.method.matches("DELETE"));
        assert_eq!(route.method.display(), "GET|POST");

        let json = r#"{"id": "r", "url": "/x"}"#;
        let route: RouteDefinition = serde_json::from_str(json).unwrap();
        assert!(route.method.matches("PATCH"));
    }

    #[test]
    fn test_collection_deserialization() {
        let json = r#"{"id": "user-2", "from": "base", "routeVariants": ["get-user:2"]}"#;
        let collection: CollectionDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(collection.from.as_deref(), Some("base"));
        assert_eq!(collection.route_variants, vec!["get-user:2"]);
    }

    #[test]
    fn test_parse_variant_ref() {
        assert_eq!(parse_variant_ref("get-user:2"), Some(("get-user", "2")));
        assert_eq!(parse_variant_ref("no-separator"), None);
        assert_eq!(parse_variant_ref(":v"), None);
        assert_eq!(parse_variant_ref("r:"), None);
        assert_eq!(variant_ref("r", "v"), "r:v");
    }
}
