//! Definition loading from a mocks directory.
//!
//! Layout: `<dir>/routes/*.{json,yaml,yml}` each holding an array of
//! route definitions, and `<dir>/collections.{json,yaml,yml}` holding the
//! collection array. Every `load_all` re-reads everything and pushes full
//! replacement arrays through this producer's two loaders — it never
//! patches. Watch/debounce is the caller's concern; this type only honors
//! the reload contract.
//!
//! A malformed routes file is skipped with an alert; the other files in
//! the same load still apply. A malformed collections file raises an
//! alert and leaves the previously loaded collections generation in
//! place.

use crate::alerts::AlertScope;
use crate::loaders::Loader;
use crate::mock::{CollectionDefinition, MockEngine, RouteDefinition};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ROUTES_DIR: &str = "routes";
const COLLECTIONS_BASENAME: &str = "collections";
const EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("definitions directory '{0}' does not exist")]
    MissingDir(PathBuf),
    #[error("i/o error reading definitions: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters reported by one `load_all` pass.
#[derive(Debug, Default, PartialEq)]
pub struct LoadSummary {
    pub routes: usize,
    pub collections: usize,
}

/// One file-based producer of routes and collections.
pub struct FileDefinitions {
    dir: PathBuf,
    routes_loader: Loader<RouteDefinition>,
    collections_loader: Loader<CollectionDefinition>,
    alerts: AlertScope,
}

impl FileDefinitions {
    pub fn new(dir: impl Into<PathBuf>, engine: &MockEngine) -> Self {
        Self {
            dir: dir.into(),
            routes_loader: engine.create_routes_loader(),
            collections_loader: engine.create_collections_loader(),
            alerts: engine.alerts().scope("files"),
        }
    }

    /// Re-read the whole directory and replace this producer's records.
    pub fn load_all(&self) -> Result<LoadSummary, LoadError> {
        if !self.dir.is_dir() {
            return Err(LoadError::MissingDir(self.dir.clone()));
        }
        self.alerts.clear();

        let routes = self.load_routes()?;
        let summary_routes = routes.len();
        self.routes_loader.load(routes);

        let collections = self.load_collections()?;
        let summary_collections = collections.as_ref().map(|c| c.len()).unwrap_or(0);
        if let Some(collections) = collections {
            self.collections_loader.load(collections);
        }

        info!(
            dir = %self.dir.display(),
            routes = summary_routes,
            collections = summary_collections,
            "definitions loaded"
        );
        Ok(LoadSummary {
            routes: summary_routes,
            collections: summary_collections,
        })
    }

    fn load_routes(&self) -> Result<Vec<RouteDefinition>, LoadError> {
        let routes_dir = self.dir.join(ROUTES_DIR);
        if !routes_dir.is_dir() {
            self.alerts.set(
                &["routes"],
                format!("No routes directory found at '{}'", routes_dir.display()),
                None,
            );
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&routes_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| has_definition_extension(path))
            .collect();
        // Deterministic load order regardless of directory iteration order.
        files.sort();

        let mut routes = Vec::new();
        for file in files {
            let stem = file_stem(&file);
            match parse_definition_file::<Vec<RouteDefinition>>(&file) {
                Ok(parsed) => {
                    debug!(file = %file.display(), routes = parsed.len(), "routes file parsed");
                    routes.extend(parsed);
                }
                Err(detail) => {
                    warn!(file = %file.display(), "skipping malformed routes file");
                    self.alerts.set(
                        &["routes", stem.as_str()],
                        format!("Error loading routes from '{}'", file.display()),
                        Some(detail),
                    );
                }
            }
        }
        Ok(routes)
    }

    /// `None` means "keep the previous generation" (malformed file); a
    /// missing collections file is a valid empty state.
    fn load_collections(&self) -> Result<Option<Vec<CollectionDefinition>>, LoadError> {
        let Some(file) = EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{COLLECTIONS_BASENAME}.{ext}")))
            .find(|path| path.is_file())
        else {
            self.alerts.set(
                &["collections"],
                format!(
                    "No collections file found in '{}'",
                    self.dir.display()
                ),
                None,
            );
            return Ok(Some(Vec::new()));
        };

        match parse_definition_file::<Vec<CollectionDefinition>>(&file) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(detail) => {
                warn!(file = %file.display(), "keeping previous collections generation");
                self.alerts.set(
                    &["collections"],
                    format!("Error loading collections from '{}'", file.display()),
                    Some(detail),
                );
                Ok(None)
            }
        }
    }
}

fn has_definition_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("?")
        .to_string()
}

fn parse_definition_file<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "json" => serde_json::from_str(&contents).map_err(|e| e.to_string()),
        _ => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertStore;
    use crate::handlers::{HandlerRegistry, ServerContext};

    fn engine() -> MockEngine {
        MockEngine::new(
            HandlerRegistry::with_builtins().unwrap(),
            ServerContext::new("."),
            AlertStore::new(),
        )
    }

    fn write(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_loads_routes_and_collections() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "routes/users.json",
            r#"[{"id": "get-users", "url": "/users", "method": "GET",
                "variants": [{"id": "ok", "type": "json", "options": {"body": []}}]}]"#,
        );
        write(
            dir.path(),
            "collections.yml",
            "- id: base\n  routeVariants:\n    - \"get-users:ok\"\n",
        );

        let engine = engine();
        let files = FileDefinitions::new(dir.path(), &engine);
        let summary = files.load_all().unwrap();
        assert_eq!(summary, LoadSummary { routes: 1, collections: 1 });

        // Both sides loaded through this producer, so the gate opened.
        let chain = engine.chain();
        assert_eq!(chain.entries().len(), 1);
        assert!(chain.entries()[0].variant.is_some());
    }

    #[test]
    fn test_malformed_routes_file_is_skipped_with_alert() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "routes/bad.json", "{not json");
        write(
            dir.path(),
            "routes/good.json",
            r#"[{"id": "r", "url": "/r", "method": "GET",
                "variants": [{"id": "v", "type": "json", "options": {"body": 1}}]}]"#,
        );
        write(dir.path(), "collections.json", r#"[{"id": "base", "routeVariants": ["r:v"]}]"#);

        let engine = engine();
        let files = FileDefinitions::new(dir.path(), &engine);
        let summary = files.load_all().unwrap();
        assert_eq!(summary.routes, 1);

        let alerts = engine.alerts().flat();
        assert!(alerts.iter().any(|a| a.id == "files:routes:bad"));
    }

    #[test]
    fn test_malformed_collections_keep_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "routes/r.json",
            r#"[{"id": "r", "url": "/r", "method": "GET",
                "variants": [{"id": "v", "type": "json", "options": {"body": 1}}]}]"#,
        );
        write(dir.path(), "collections.json", r#"[{"id": "base", "routeVariants": ["r:v"]}]"#);

        let engine = engine();
        let files = FileDefinitions::new(dir.path(), &engine);
        files.load_all().unwrap();
        let before = engine.chain().generation();

        // Break the collections file; the routes side still reloads.
        write(dir.path(), "collections.json", "][");
        files.load_all().unwrap();

        let chain = engine.chain();
        assert!(chain.generation() > before);
        assert!(chain.entries()[0].variant.is_some(), "previous collections survive");
        assert!(engine
            .alerts()
            .flat()
            .iter()
            .any(|a| a.id == "files:collections"));
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let engine = engine();
        let files = FileDefinitions::new("/definitely/not/here", &engine);
        assert!(matches!(files.load_all(), Err(LoadError::MissingDir(_))));
    }
}
