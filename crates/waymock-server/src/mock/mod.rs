//! The mock resolution engine.
//!
//! This module turns independently-loaded route and collection
//! definitions into one coherent, currently-active set of request
//! handlers:
//!
//! - `types`: route, variant and collection definition records
//! - `gate`: load-readiness latch coalescing the two load streams
//! - `resolver`: inheritance/override resolution and chain construction
//! - `engine`: composition root, override API and introspection views

mod engine;
mod gate;
mod resolver;
mod types;


pub use engine::{EngineStatus, MockEngine, OverrideError};
pub use gate::{GateSignal, LoadGate};
pub use resolver::{ActiveVariant, ChainEntry, HandlerChain, MatchOutcome};
pub use types::{
    parse_variant_ref, variant_ref, CollectionDefinition, CollectionPlain, RouteDefinition,
    RouteMethod, RouteVariantPlain, VariantDefinition,
};
