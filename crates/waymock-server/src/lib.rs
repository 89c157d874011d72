// Library exports for integration tests and programmatic embedding.

// ===== Core mock resolution engine =====
pub mod alerts;
pub mod handlers;
pub mod loaders;
pub mod mock;

// ===== Definition sources & serving =====
pub mod config;
pub mod files;
pub mod server;

pub use mock::MockEngine;
