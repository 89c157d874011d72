//! Collection resolution and handler-chain construction.
//!
//! A resolution pass turns the current routes, collections, selected
//! collection id and custom override set into one fresh [`HandlerChain`].
//! Every inconsistency it finds becomes an alert plus a best-effort
//! fallback; the pass itself never fails. The previous chain is never
//! mutated — the caller swaps the new chain in by replacing an `Arc`.

use crate::alerts::AlertScope;
use crate::handlers::{
    BoundHandler, HandlerKind, HandlerRegistry, ServerContext, SUBPATH_PARAM,
};
use crate::mock::types::{
    parse_variant_ref, variant_ref, CollectionDefinition, RouteDefinition, RouteMethod,
    VariantDefinition,
};
use matchit::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// Active handler chain
// ============================================================================

/// One mounted route in the active chain.
pub struct ChainEntry {
    pub route_id: String,
    pub url: String,
    pub method: RouteMethod,
    /// Route-level response delay in milliseconds.
    pub delay: Option<u64>,
    /// `None` when no variant resolved for this route: defined by neither
    /// the collection chain nor the overrides, or the resolved variant was
    /// disabled or failed validation. Requests then answer not-found.
    pub variant: Option<ActiveVariant>,
}

/// The variant bound for a route in this resolution pass.
pub struct ActiveVariant {
    pub variant_id: String,
    /// Variant-level delay, overriding the route delay when set.
    pub delay: Option<u64>,
    /// Request contract shape of the handler type (plain responder or
    /// sub-routing), captured at bind time.
    pub kind: HandlerKind,
    pub handler: Arc<dyn BoundHandler>,
}

/// Result of matching an incoming request against the chain.
pub enum MatchOutcome<'a> {
    /// Route and variant found; dispatch to the handler.
    Variant {
        entry: &'a ChainEntry,
        variant: &'a ActiveVariant,
        params: HashMap<String, String>,
    },
    /// Route matched but has no active variant this pass.
    NoVariant(&'a ChainEntry),
    NotFound,
}

/// The single, currently-mounted set of request handlers.
///
/// Rebuilt wholesale by each resolution pass and swapped by reference, so
/// a request sees either the fully-old or fully-new chain, never a mix.
pub struct HandlerChain {
    generation: u64,
    /// Collection the chain was resolved from (after fallback).
    collection: Option<String>,
    router: Router<Vec<usize>>,
    entries: Vec<ChainEntry>,
}

impl HandlerChain {
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            collection: None,
            router: Router::new(),
            entries: Vec::new(),
        }
    }

    /// Monotonic id distinguishing one resolution pass's chain from the
    /// next; lets observers verify an atomic swap happened.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn match_request(&self, method: &str, path: &str) -> MatchOutcome<'_> {
        let Ok(matched) = self.router.at(path) else {
            return MatchOutcome::NotFound;
        };

        let params: HashMap<String, String> = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        for &index in matched.value {
            let entry = &self.entries[index];
            if !entry.method.matches(method) {
                continue;
            }
            return match entry.variant {
                Some(ref variant) => MatchOutcome::Variant {
                    entry,
                    variant,
                    params,
                },
                None => MatchOutcome::NoVariant(entry),
            };
        }
        MatchOutcome::NotFound
    }
}

// ============================================================================
// Inheritance walk & effective mapping (pure, shared with plain views)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WalkProblem {
    UnknownParent { collection: String, parent: String },
    Cycle { collection: String, parent: String },
}

/// Walk the `from` chain from `start` to its root ancestor.
///
/// Returns the chain root-first. A cycle is a hard stop: the cyclic tail
/// is treated as absent and reported, never looped.
pub(crate) fn walk_ancestors<'c>(
    collections: &'c [CollectionDefinition],
    start: &'c CollectionDefinition,
) -> (Vec<&'c CollectionDefinition>, Vec<WalkProblem>) {
    let mut chain: Vec<&CollectionDefinition> = vec![start];
    let mut problems = Vec::new();
    let mut visited: Vec<&str> = vec![start.id.as_str()];

    let mut current = start;
    while let Some(parent_id) = current.from.as_deref() {
        if visited.contains(&parent_id) {
            problems.push(WalkProblem::Cycle {
                collection: current.id.clone(),
                parent: parent_id.to_string(),
            });
            break;
        }
        let Some(parent) = collections.iter().find(|c| c.id == parent_id) else {
            problems.push(WalkProblem::UnknownParent {
                collection: current.id.clone(),
                parent: parent_id.to_string(),
            });
            break;
        };
        visited.push(parent_id);
        chain.push(parent);
        current = parent;
    }

    chain.reverse();
    (chain, problems)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MappingProblem {
    /// Reference is not of the `routeId:variantId` form.
    InvalidRef { collection: String, reference: String },
    /// Reference names a route or variant that does not exist.
    DanglingRef { collection: String, reference: String },
}

/// Ordered `routeId -> variantId` mapping. Upserts keep the position of
/// the first occurrence so descendants override ancestors in place.
#[derive(Debug, Default)]
pub(crate) struct EffectiveMapping {
    entries: Vec<(String, String)>,
}

impl EffectiveMapping {
    pub(crate) fn upsert(&mut self, route_id: &str, variant_id: &str) {
        if let Some(slot) = self.entries.iter_mut().find(|(r, _)| r == route_id) {
            slot.1 = variant_id.to_string();
        } else {
            self.entries
                .push((route_id.to_string(), variant_id.to_string()));
        }
    }

    pub(crate) fn get(&self, route_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| r == route_id)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn refs(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(r, v)| variant_ref(r, v))
            .collect()
    }
}

/// Apply each ancestor's defined entries in root-to-leaf order, so a
/// descendant's entry for a given route always wins.
pub(crate) fn effective_mapping(
    chain: &[&CollectionDefinition],
    routes: &RouteIndex<'_>,
) -> (EffectiveMapping, Vec<MappingProblem>) {
    let mut mapping = EffectiveMapping::default();
    let mut problems = Vec::new();

    for collection in chain {
        for reference in &collection.route_variants {
            let Some((route_id, variant_id)) = parse_variant_ref(reference) else {
                problems.push(MappingProblem::InvalidRef {
                    collection: collection.id.clone(),
                    reference: reference.clone(),
                });
                continue;
            };
            if routes.variant(route_id, variant_id).is_none() {
                problems.push(MappingProblem::DanglingRef {
                    collection: collection.id.clone(),
                    reference: reference.clone(),
                });
                continue;
            }
            mapping.upsert(route_id, variant_id);
        }
    }

    (mapping, problems)
}

// ============================================================================
// Route index
// ============================================================================

/// Routes deduplicated by id, in first-seen order (last definition wins).
pub(crate) struct RouteIndex<'r> {
    order: Vec<&'r str>,
    by_id: HashMap<&'r str, &'r RouteDefinition>,
    pub(crate) duplicates: Vec<String>,
}

impl<'r> RouteIndex<'r> {
    pub(crate) fn build(routes: &'r [RouteDefinition]) -> Self {
        let mut order = Vec::new();
        let mut by_id: HashMap<&str, &RouteDefinition> = HashMap::new();
        let mut duplicates = Vec::new();
        for route in routes {
            if by_id.insert(route.id.as_str(), route).is_some() {
                duplicates.push(route.id.clone());
            } else {
                order.push(route.id.as_str());
            }
        }
        Self {
            order,
            by_id,
            duplicates,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RouteDefinition> + '_ {
        self.order.iter().map(|id| self.by_id[id])
    }

    pub(crate) fn variant(&self, route_id: &str, variant_id: &str) -> Option<&VariantDefinition> {
        self.by_id
            .get(route_id)?
            .variants
            .iter()
            .find(|v| v.id == variant_id)
    }
}

// ============================================================================
// URL pattern translation
// ============================================================================

/// Translate an express-style pattern (`/users/:id`, `/assets/*`) into the
/// radix-router syntax (`/users/{id}`, `/assets/{*rest}`).
pub(crate) fn translate_url(url: &str) -> Result<String, String> {
    if !url.starts_with('/') {
        return Err(format!("url '{url}' must start with '/'"));
    }
    if url == "/" {
        return Ok("/".to_string());
    }

    let trimmed = url.strip_suffix('/').unwrap_or(url);
    let segments: Vec<&str> = trimmed[1..].split('/').collect();
    let mut out = String::new();

    for (index, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            return Err(format!("url '{url}' has an empty segment"));
        }
        if segment.contains('{') || segment.contains('}') {
            return Err(format!("url '{url}' contains reserved characters"));
        }
        out.push('/');
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() {
                return Err(format!("url '{url}' has an unnamed parameter"));
            }
            out.push('{');
            out.push_str(name);
            out.push('}');
        } else if *segment == "*" {
            if index != segments.len() - 1 {
                return Err(format!("url '{url}' uses '*' before the last segment"));
            }
            out.push_str(&format!("{{*{SUBPATH_PARAM}}}"));
        } else {
            out.push_str(segment);
        }
    }
    Ok(out)
}

// ============================================================================
// Resolver
// ============================================================================

/// Snapshot inputs for one resolution pass.
pub(crate) struct Resolver<'a> {
    pub routes: &'a [RouteDefinition],
    pub collections: &'a [CollectionDefinition],
    pub selected: Option<&'a str>,
    /// Custom override set, highest precedence.
    pub overrides: &'a [(String, String)],
    pub registry: &'a HandlerRegistry,
    pub context: &'a ServerContext,
    /// Alert subtree owned by the resolver (`mock`). Cleared and rebuilt
    /// every pass so stale alerts never outlive the state they describe.
    pub alerts: &'a AlertScope,
}

impl Resolver<'_> {
    pub(crate) fn resolve(&self, generation: u64) -> HandlerChain {
        self.alerts.clear();

        let routes = RouteIndex::build(self.routes);
        for id in &routes.duplicates {
            self.alerts.set(
                &["routes", id.as_str()],
                format!("Route id '{id}' is duplicated; the last definition wins"),
                None,
            );
        }

        let selected = self.select_collection();
        let mapping = match selected {
            Some(collection) => self.collection_mapping(collection, &routes),
            None => EffectiveMapping::default(),
        };
        let mapping = self.apply_overrides(mapping, &routes);

        let entries = self.bind_entries(&routes, &mapping);
        let router = self.mount(&entries);

        debug!(
            generation,
            routes = entries.len(),
            collection = selected.map(|c| c.id.as_str()).unwrap_or("-"),
            "handler chain rebuilt"
        );

        HandlerChain {
            generation,
            collection: selected.map(|c| c.id.clone()),
            router,
            entries,
        }
    }

    /// Step 1: pick the collection to serve, falling back to the first in
    /// load order when the selected id is unknown. The fallback is
    /// re-evaluated every pass; it is not sticky.
    fn select_collection(&self) -> Option<&CollectionDefinition> {
        if self.collections.is_empty() {
            self.alerts
                .set(&["collections"], "No collections found", None);
            return None;
        }

        match self.selected {
            Some(id) => match self.collections.iter().find(|c| c.id == id) {
                Some(collection) => Some(collection),
                None => {
                    self.alerts.set(
                        &["collections", "selected"],
                        format!("Collection '{id}' was not found"),
                        None,
                    );
                    self.collections.first()
                }
            },
            None => self.collections.first(),
        }
    }

    /// Steps 2–3: ancestor walk plus root-to-leaf mapping application.
    fn collection_mapping(
        &self,
        selected: &CollectionDefinition,
        routes: &RouteIndex<'_>,
    ) -> EffectiveMapping {
        let (chain, walk_problems) = walk_ancestors(self.collections, selected);
        for problem in walk_problems {
            match problem {
                WalkProblem::Cycle { collection, parent } => {
                    warn!(%collection, %parent, "collection inheritance cycle");
                    self.alerts.set(
                        &["collections", collection.as_str(), "from"],
                        format!(
                            "Collection '{collection}' inheritance from '{parent}' is cyclic; \
                             ignoring the parent"
                        ),
                        None,
                    );
                }
                WalkProblem::UnknownParent { collection, parent } => {
                    self.alerts.set(
                        &["collections", collection.as_str(), "from"],
                        format!("Collection '{collection}' inherits from unknown collection '{parent}'"),
                        None,
                    );
                }
            }
        }

        let (mapping, mapping_problems) = effective_mapping(&chain, routes);
        for problem in mapping_problems {
            match problem {
                MappingProblem::InvalidRef {
                    collection,
                    reference,
                } => {
                    self.alerts.set(
                        &["collections", collection.as_str(), reference.as_str()],
                        format!(
                            "Collection '{collection}' route variant reference '{reference}' \
                             is not of the form 'routeId:variantId'"
                        ),
                        None,
                    );
                }
                MappingProblem::DanglingRef {
                    collection,
                    reference,
                } => {
                    self.alerts.set(
                        &["collections", collection.as_str(), reference.as_str()],
                        format!(
                            "Collection '{collection}' references unknown route variant \
                             '{reference}'"
                        ),
                        None,
                    );
                }
            }
        }
        mapping
    }

    /// Step 4: the custom override set wins unconditionally per route id.
    fn apply_overrides(
        &self,
        mut mapping: EffectiveMapping,
        routes: &RouteIndex<'_>,
    ) -> EffectiveMapping {
        for (route_id, variant_id) in self.overrides {
            let reference = variant_ref(route_id, variant_id);
            if routes.variant(route_id, variant_id).is_none() {
                self.alerts.set(
                    &["overrides", reference.as_str()],
                    format!("Custom variant '{reference}' references an unknown route variant"),
                    None,
                );
                continue;
            }
            mapping.upsert(route_id, variant_id);
        }
        mapping
    }

    /// Steps 5–6: bind one handler instance per resolved variant. Invalid
    /// options or unknown handler types disable the variant for this pass
    /// only; the route then has no active variant.
    fn bind_entries(&self, routes: &RouteIndex<'_>, mapping: &EffectiveMapping) -> Vec<ChainEntry> {
        let mut entries = Vec::new();

        for route in routes.iter() {
            let variant = mapping
                .get(&route.id)
                .and_then(|variant_id| self.bind_variant(route, variant_id));

            entries.push(ChainEntry {
                route_id: route.id.clone(),
                url: route.url.clone(),
                method: route.method.clone(),
                delay: route.delay,
                variant,
            });
        }
        entries
    }

    fn bind_variant(&self, route: &RouteDefinition, variant_id: &str) -> Option<ActiveVariant> {
        let reference = variant_ref(&route.id, variant_id);
        let definition = route.variants.iter().find(|v| v.id == variant_id)?;

        if definition.disabled {
            debug!(%reference, "variant disabled by definition");
            return None;
        }

        let Some(handler) = self.registry.lookup(&definition.handler_type) else {
            self.alerts.set(
                &["variants", reference.as_str()],
                format!(
                    "Variant '{reference}' has unknown handler type '{}'",
                    definition.handler_type
                ),
                None,
            );
            return None;
        };

        match handler.bind(&definition.options, self.context) {
            Ok(bound) => Some(ActiveVariant {
                variant_id: variant_id.to_string(),
                delay: definition.delay,
                kind: handler.kind(),
                handler: bound,
            }),
            Err(error) => {
                self.alerts.set(
                    &["variants", reference.as_str()],
                    format!("'{reference}' options are invalid: {error}"),
                    Some(error.to_string()),
                );
                None
            }
        }
    }

    /// Step 6 continued: mount every entry on a fresh radix router. Routes
    /// sharing a path pattern share a router slot and are told apart by
    /// method at match time. Sub-routing handlers are mounted both at the
    /// exact path and below it.
    fn mount(&self, entries: &[ChainEntry]) -> Router<Vec<usize>> {
        let mut paths: Vec<(String, Vec<usize>)> = Vec::new();
        let mut add = |path: String, index: usize| {
            if let Some(slot) = paths.iter_mut().find(|(p, _)| *p == path) {
                slot.1.push(index);
            } else {
                paths.push((path, vec![index]));
            }
        };

        for (index, entry) in entries.iter().enumerate() {
            let translated = match translate_url(&entry.url) {
                Ok(t) => t,
                Err(detail) => {
                    self.alerts.set(
                        &["routes", entry.route_id.as_str()],
                        format!("Route '{}' url pattern is invalid: {detail}", entry.route_id),
                        None,
                    );
                    continue;
                }
            };

            let subtree = entry
                .variant
                .as_ref()
                .map(|v| v.kind == HandlerKind::Router)
                .unwrap_or(false);

            if subtree && !translated.contains("{*") {
                let base = translated.strip_suffix('/').unwrap_or(&translated);
                add(base.to_string(), index);
                add(format!("{base}/{{*{SUBPATH_PARAM}}}"), index);
            } else {
                add(translated, index);
            }
        }

        let mut router = Router::new();
        for (path, indices) in paths {
            let first_route = indices
                .first()
                .map(|&i| entries[i].route_id.as_str())
                .unwrap_or("?");
            if let Err(error) = router.insert(path.as_str(), indices.clone()) {
                self.alerts.set(
                    &["routes", first_route],
                    format!("Failed to mount url pattern '{path}': {error}"),
                    None,
                );
            }
        }
        router
    }
}
