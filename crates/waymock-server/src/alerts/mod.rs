//! Hierarchical alert store.
//!
//! Every subsystem reports non-fatal problems here instead of failing the
//! operation that detected them: unknown collections, dangling variant
//! references, invalid handler options, unreadable definition files. Alerts
//! form a tree keyed by path segments; the flattened view joins segments
//! with `:` into composite ids (the root segment is not part of the id).
//!
//! Writers own disjoint subtrees (the resolver writes under `mock`, the
//! file loader under `files`), so concurrent writes are independent keyed
//! upserts. Setting an existing id overwrites the entry in place and keeps
//! its position; removing an id drops its whole subtree.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Separator used when flattening alert paths into composite ids.
const ID_SEPARATOR: &str = ":";

type ChangeListener = Box<dyn Fn() + Send + Sync>;

/// One flattened alert entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FlatAlert {
    pub id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct AlertNode {
    value: Option<AlertValue>,
    /// Children in insertion order. Overwrites keep the original slot.
    children: Vec<(String, AlertNode)>,
}

#[derive(Debug, Clone)]
struct AlertValue {
    message: String,
    error: Option<String>,
}

impl AlertNode {
    fn child_mut(&mut self, segment: &str) -> &mut AlertNode {
        let index = match self.children.iter().position(|(s, _)| s == segment) {
            Some(index) => index,
            None => {
                self.children
                    .push((segment.to_string(), AlertNode::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[index].1
    }

    fn remove_child(&mut self, path: &[String]) -> bool {
        match path {
            [] => false,
            [segment] => {
                let before = self.children.len();
                self.children.retain(|(s, _)| s != segment);
                self.children.len() != before
            }
            [segment, rest @ ..] => self
                .children
                .iter_mut()
                .find(|(s, _)| s == segment)
                .map(|(_, child)| child.remove_child(rest))
                .unwrap_or(false),
        }
    }

    fn flatten(&self, prefix: &[String], out: &mut Vec<FlatAlert>) {
        if let Some(ref value) = self.value {
            out.push(FlatAlert {
                id: prefix.join(ID_SEPARATOR),
                message: value.message.clone(),
                error: value.error.clone(),
            });
        }
        for (segment, child) in &self.children {
            let mut next = prefix.to_vec();
            next.push(segment.clone());
            child.flatten(&next, out);
        }
    }
}

/// Tree-shaped store of named, ordered alert entries.
///
/// Cheap to clone; clones share the same underlying tree.
#[derive(Clone)]
pub struct AlertStore {
    root: Arc<RwLock<AlertNode>>,
    listeners: Arc<RwLock<Vec<ChangeListener>>>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(AlertNode::default())),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a listener fired after every `set`/`remove`.
    ///
    /// Listeners are invoked outside the store lock, so they may read
    /// `flat()` without deadlocking.
    pub fn on_change(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Create or overwrite the entry at `path`.
    pub fn set<S: AsRef<str>>(&self, path: &[S], message: impl Into<String>, error: Option<String>) {
        if path.is_empty() {
            return;
        }
        {
            let mut root = self.root.write();
            let mut node = &mut *root;
            for segment in path {
                node = node.child_mut(segment.as_ref());
            }
            node.value = Some(AlertValue {
                message: message.into(),
                error,
            });
        }
        self.notify();
    }

    /// Remove the entry at `path` together with all of its descendants.
    /// Removing a path that does not exist is a no-op (no notification).
    pub fn remove<S: AsRef<str>>(&self, path: &[S]) {
        let owned: Vec<String> = path.iter().map(|s| s.as_ref().to_string()).collect();
        let removed = self.root.write().remove_child(&owned);
        if removed {
            self.notify();
        }
    }

    /// Flattened, ordered view of all current alerts.
    pub fn flat(&self) -> Vec<FlatAlert> {
        let root = self.root.read();
        let mut out = Vec::new();
        for (segment, child) in &root.children {
            child.flatten(&[segment.clone()], &mut out);
        }
        out
    }

    /// A write handle rooted at `segment`, for components that own a subtree.
    pub fn scope(&self, segment: impl Into<String>) -> AlertScope {
        AlertScope {
            store: self.clone(),
            prefix: vec![segment.into()],
        }
    }

    fn notify(&self) {
        for listener in self.listeners.read().iter() {
            listener();
        }
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped write handle: all paths are prefixed with the scope's segments.
#[derive(Clone)]
pub struct AlertScope {
    store: AlertStore,
    prefix: Vec<String>,
}

impl AlertScope {
    pub fn set<S: AsRef<str>>(&self, path: &[S], message: impl Into<String>, error: Option<String>) {
        let full = self.full_path(path);
        self.store.set(&full, message, error);
    }

    pub fn remove<S: AsRef<str>>(&self, path: &[S]) {
        let full = self.full_path(path);
        self.store.remove(&full);
    }

    /// Drop every alert below this scope.
    pub fn clear(&self) {
        self.store.remove(&self.prefix);
    }

    /// Nested scope one level deeper.
    pub fn scope(&self, segment: impl Into<String>) -> AlertScope {
        let mut prefix = self.prefix.clone();
        prefix.push(segment.into());
        AlertScope {
            store: self.store.clone(),
            prefix,
        }
    }

    fn full_path<S: AsRef<str>>(&self, path: &[S]) -> Vec<String> {
        let mut full = self.prefix.clone();
        full.extend(path.iter().map(|s| s.as_ref().to_string()));
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_set_and_flatten() {
        let store = AlertStore::new();
        store.set(&["mock", "collections", "selected"], "not found", None);
        store.set(&["files", "users"], "parse error", Some("bad yaml".into()));

        let flat = store.flat();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].id, "mock:collections:selected");
        assert_eq!(flat[0].message, "not found");
        assert_eq!(flat[1].id, "files:users");
        assert_eq!(flat[1].error.as_deref(), Some("bad yaml"));
    }

    #[test]
    fn test_overwrite_preserves_position() {
        let store = AlertStore::new();
        store.set(&["a"], "first", None);
        store.set(&["b"], "second", None);
        store.set(&["a"], "updated", None);

        let flat = store.flat();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].id, "a");
        assert_eq!(flat[0].message, "updated");
        assert_eq!(flat[1].id, "b");
    }

    #[test]
    fn test_remove_drops_subtree() {
        let store = AlertStore::new();
        store.set(&["mock", "routes", "r1"], "one", None);
        store.set(&["mock", "routes", "r2"], "two", None);
        store.set(&["files", "x"], "keep", None);

        store.remove(&["mock"]);
        let flat = store.flat();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].id, "files:x");
    }

    #[test]
    fn test_intermediate_nodes_without_value_are_not_listed() {
        let store = AlertStore::new();
        store.set(&["mock", "collections", "c1", "from"], "cycle", None);
        let flat = store.flat();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].id, "mock:collections:c1:from");
    }

    #[test]
    fn test_scope_prefixes_paths() {
        let store = AlertStore::new();
        let scope = store.scope("mock").scope("variants");
        scope.set(&["r1:v1"], "invalid", None);
        assert_eq!(store.flat()[0].id, "mock:variants:r1:v1");

        scope.clear();
        assert!(store.flat().is_empty());
    }

    #[test]
    fn test_listeners_fire_on_set_and_remove() {
        let store = AlertStore::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        store.on_change(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set(&["a"], "x", None);
        store.remove(&["a"]);
        // Removing again is a no-op and must not notify.
        store.remove(&["a"]);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
