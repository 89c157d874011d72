//! Mock engine: the composition root of the resolution machinery.
//!
//! Owns the routes and collections loader managers, the load-readiness
//! gate, the selected collection, the custom override set and the active
//! handler chain. All mutation funnels through here; the resolver only
//! ever reads snapshots and produces a fresh chain that is swapped in by
//! a single `Arc` replacement.

use crate::alerts::{AlertScope, AlertStore};
use crate::handlers::{HandlerRegistry, ServerContext};
use crate::loaders::{Loader, LoaderManager};
use crate::mock::gate::{GateSignal, LoadGate};
use crate::mock::resolver::{walk_ancestors, effective_mapping, HandlerChain, Resolver, RouteIndex};
use crate::mock::types::{
    parse_variant_ref, variant_ref, CollectionDefinition, CollectionPlain, RouteDefinition,
    RouteVariantPlain,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("'{0}' is not of the form 'routeId:variantId'")]
    MalformedReference(String),
}

/// Snapshot of the engine for status/introspection surfaces.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Generation of the active handler chain; bumps on every swap.
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub routes: usize,
    pub collections: usize,
    pub alerts: usize,
}

struct EngineInner {
    alerts: AlertStore,
    /// Resolver-owned alert subtree, cleared and rebuilt every pass.
    mock_alerts: AlertScope,
    registry: HandlerRegistry,
    context: ServerContext,
    routes: LoaderManager<RouteDefinition>,
    collections: LoaderManager<CollectionDefinition>,
    selected: RwLock<Option<String>>,
    /// Custom override set: `routeId -> variantId`, top precedence,
    /// cleared only by an explicit restore, never by a collection change.
    overrides: RwLock<Vec<(String, String)>>,
    chain: RwLock<Arc<HandlerChain>>,
    /// Serializes gate decisions and resolution passes so two concurrent
    /// loads cannot interleave their snapshots.
    gate: Mutex<LoadGate>,
    generation: AtomicU64,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl EngineInner {
    /// Deliver a load signal; resolve if the gate is (now) open.
    fn signal(&self, signal: GateSignal) {
        let mut gate = self.gate.lock();
        if gate.signal(signal) {
            self.resolve_locked();
        } else {
            debug!(?signal, "load gate not ready yet, resolution deferred");
        }
    }

    /// Re-resolve for a non-load change (selection, overrides). Before the
    /// gate has opened the change is only recorded; the first gated
    /// resolution will pick it up.
    fn refresh(&self) {
        let gate = self.gate.lock();
        if gate.is_ready() {
            self.resolve_locked();
        }
    }

    /// Run one resolution pass. Caller holds the gate lock, which
    /// serializes passes; readers are never blocked — they hold `Arc`
    /// clones of the previous chain until the swap.
    fn resolve_locked(&self) {
        let routes = self.routes.resources();
        let collections = self.collections.resources();
        let selected = self.selected.read().clone();
        let overrides = self.overrides.read().clone();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let resolver = Resolver {
            routes: &routes,
            collections: &collections,
            selected: selected.as_deref(),
            overrides: &overrides,
            registry: &self.registry,
            context: &self.context,
            alerts: &self.mock_alerts,
        };
        let chain = Arc::new(resolver.resolve(generation));

        // The atomic swap: requests dispatched before this line complete
        // against the old chain, requests after it see the new one.
        *self.chain.write() = chain;
    }
}

/// Public handle to the mock resolution engine. Cheap to clone.
#[derive(Clone)]
pub struct MockEngine {
    inner: Arc<EngineInner>,
}

impl MockEngine {
    pub fn new(registry: HandlerRegistry, context: ServerContext, alerts: AlertStore) -> Self {
        let mock_alerts = alerts.scope("mock");

        let inner = Arc::new(EngineInner {
            alerts,
            mock_alerts,
            registry,
            context,
            routes: LoaderManager::new("routes"),
            collections: LoaderManager::new("collections"),
            selected: RwLock::new(None),
            overrides: RwLock::new(Vec::new()),
            chain: RwLock::new(Arc::new(HandlerChain::empty(0))),
            gate: Mutex::new(LoadGate::new()),
            generation: AtomicU64::new(0),
            started_at: chrono::Utc::now(),
        });

        // Loader notifications go straight into the gate. Weak references
        // keep the manager -> engine edge from forming a reference cycle.
        let weak: Weak<EngineInner> = Arc::downgrade(&inner);
        inner.routes.on_load(move || {
            if let Some(inner) = weak.upgrade() {
                inner.signal(GateSignal::Routes);
            }
        });
        let weak: Weak<EngineInner> = Arc::downgrade(&inner);
        inner.collections.on_load(move || {
            if let Some(inner) = weak.upgrade() {
                inner.signal(GateSignal::Collections);
            }
        });

        Self { inner }
    }

    // ------------------------------------------------------------------
    // Loader producers
    // ------------------------------------------------------------------

    pub fn create_routes_loader(&self) -> Loader<RouteDefinition> {
        self.inner.routes.create_loader()
    }

    pub fn create_collections_loader(&self) -> Loader<CollectionDefinition> {
        self.inner.collections.create_loader()
    }

    // ------------------------------------------------------------------
    // Selection & custom overrides
    // ------------------------------------------------------------------

    /// Change the collection to serve. `None` falls back to the first
    /// collection in load order.
    pub fn select_collection(&self, id: Option<String>) {
        info!(collection = id.as_deref().unwrap_or("-"), "collection selected");
        *self.inner.selected.write() = id;
        self.inner.refresh();
    }

    /// Layer a runtime `routeId:variantId` override on top of the
    /// effective collection mapping.
    pub fn use_route_variant(&self, reference: &str) -> Result<(), OverrideError> {
        let (route_id, variant_id) = parse_variant_ref(reference)
            .ok_or_else(|| OverrideError::MalformedReference(reference.to_string()))?;

        {
            let mut overrides = self.inner.overrides.write();
            if let Some(slot) = overrides.iter_mut().find(|(r, _)| r == route_id) {
                slot.1 = variant_id.to_string();
            } else {
                overrides.push((route_id.to_string(), variant_id.to_string()));
            }
        }
        info!(reference, "custom route variant set");
        self.inner.refresh();
        Ok(())
    }

    /// Drop every custom override and fall back to the pure collection
    /// mapping.
    pub fn restore_route_variants(&self) {
        self.inner.overrides.write().clear();
        info!("custom route variants restored");
        self.inner.refresh();
    }

    /// Current override set as external references, in insertion order.
    pub fn custom_route_variants(&self) -> Vec<String> {
        self.inner
            .overrides
            .read()
            .iter()
            .map(|(r, v)| variant_ref(r, v))
            .collect()
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    /// The currently-active handler chain. The returned `Arc` stays valid
    /// (and consistent) for as long as the caller holds it, even across
    /// subsequent swaps.
    pub fn chain(&self) -> Arc<HandlerChain> {
        self.inner.chain.read().clone()
    }

    pub fn alerts(&self) -> &AlertStore {
        &self.inner.alerts
    }

    pub fn context(&self) -> &ServerContext {
        &self.inner.context
    }

    /// Collection id the active chain was resolved from (after fallback).
    pub fn selected_collection(&self) -> Option<String> {
        self.chain().collection().map(str::to_string)
    }

    pub fn status(&self) -> EngineStatus {
        let chain = self.chain();
        EngineStatus {
            started_at: self.inner.started_at,
            generation: chain.generation(),
            collection: chain.collection().map(str::to_string),
            routes: self.inner.routes.resources().len(),
            collections: self.inner.collections.resources().len(),
            alerts: self.inner.alerts.flat().len(),
        }
    }

    /// Flattened collections with their defined and effective routes.
    pub fn collections_plain(&self) -> Vec<CollectionPlain> {
        let collections = self.inner.collections.resources();
        let routes = self.inner.routes.resources();
        let index = RouteIndex::build(&routes);

        collections
            .iter()
            .map(|collection| {
                // Problems are reported by resolution passes; the plain
                // view is a quiet read.
                let (chain, _) = walk_ancestors(&collections, collection);
                let (mapping, _) = effective_mapping(&chain, &index);
                CollectionPlain {
                    id: collection.id.clone(),
                    from: collection.from.clone(),
                    defined_routes: collection.route_variants.clone(),
                    effective_routes: mapping.refs(),
                }
            })
            .collect()
    }

    /// Flattened route variants with handler previews.
    pub fn route_variants_plain(&self) -> Vec<RouteVariantPlain> {
        let routes = self.inner.routes.resources();
        let index = RouteIndex::build(&routes);

        let mut out = Vec::new();
        for route in index.iter() {
            for variant in &route.variants {
                let preview = self
                    .inner
                    .registry
                    .lookup(&variant.handler_type)
                    .and_then(|handler| handler.bind(&variant.options, &self.inner.context).ok())
                    .and_then(|bound| bound.preview());
                out.push(RouteVariantPlain {
                    id: variant_ref(&route.id, &variant.id),
                    route: route.id.clone(),
                    handler_type: variant.handler_type.clone(),
                    disabled: variant.disabled,
                    preview,
                    delay: variant.delay,
                });
            }
        }
        out
    }
}
