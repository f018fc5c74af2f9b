//! Named component store with lazy singleton materialization.
//!
//! A [`Registry`] holds one category of pluggable components (formats,
//! services, handlers). Each entry is either a factory that has not run yet
//! or an instance that has already been built; the first [`Registry::resolve`]
//! turns the former into the latter and every later lookup returns the same
//! `Arc`.
//!
//! Iteration order is insertion order. `prepend` moves an entry to the front,
//! which is the only priority mechanism: the handler chain runs entries in
//! exactly this order.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// The reserved name of the fallback entry every registry carries.
pub const DEFAULT_NAME: &str = "";

/// Constructor for a component. Runs at most once per entry in practice;
/// concurrent first lookups may race, in which case one result is kept and
/// the other is dropped.
pub type Factory<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

/// Errors from registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown {category}: '{name}'")]
    UnknownComponent {
        category: &'static str,
        name: String,
    },
}

enum Slot<T: ?Sized> {
    Lazy {
        factory: Factory<T>,
        instance: OnceLock<Arc<T>>,
    },
    Ready(Arc<T>),
}

struct Entry<T: ?Sized> {
    name: String,
    slot: Slot<T>,
}

impl<T: ?Sized> Entry<T> {
    fn lazy(name: String, factory: Factory<T>) -> Self {
        Self {
            name,
            slot: Slot::Lazy {
                factory,
                instance: OnceLock::new(),
            },
        }
    }

    fn ready(name: String, instance: Arc<T>) -> Self {
        Self {
            name,
            slot: Slot::Ready(instance),
        }
    }

    fn materialize(&self) -> Arc<T> {
        match &self.slot {
            Slot::Lazy { factory, instance } => Arc::clone(instance.get_or_init(|| factory())),
            Slot::Ready(instance) => Arc::clone(instance),
        }
    }

    fn instance(&self) -> Option<&Arc<T>> {
        match &self.slot {
            Slot::Lazy { instance, .. } => instance.get(),
            Slot::Ready(instance) => Some(instance),
        }
    }

    fn factory(&self) -> Option<&Factory<T>> {
        match &self.slot {
            Slot::Lazy { factory, .. } => Some(factory),
            Slot::Ready(_) => None,
        }
    }
}

/// Ordered, lazily-instantiated component store for one category.
///
/// The empty name ([`DEFAULT_NAME`]) is always present and serves as the
/// fallback when a requested name is unknown. It can be replaced but never
/// removed.
pub struct Registry<T: ?Sized> {
    category: &'static str,
    entries: Vec<Entry<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Creates a registry whose fallback entry is built by `default`.
    #[must_use]
    pub fn new(category: &'static str, default: Factory<T>) -> Self {
        Self {
            category,
            entries: vec![Entry::lazy(DEFAULT_NAME.to_string(), default)],
        }
    }

    /// Creates a registry whose fallback entry is an existing instance.
    #[must_use]
    pub fn with_default_instance(category: &'static str, default: Arc<T>) -> Self {
        Self {
            category,
            entries: vec![Entry::ready(DEFAULT_NAME.to_string(), default)],
        }
    }

    /// Category label used in error messages (`"format"`, `"service"`, ...).
    #[must_use]
    pub fn category(&self) -> &'static str {
        self.category
    }

    /// Inserts or replaces the factory registered under `name`.
    ///
    /// Replacing keeps the entry's position unless `prepend` is set, in which
    /// case the entry moves to the front of the iteration order.
    pub fn add(&mut self, name: impl Into<String>, factory: Factory<T>, prepend: bool) -> &mut Self {
        self.insert(Entry::lazy(name.into(), factory), prepend)
    }

    /// Inserts or replaces `name` with an already-built instance.
    pub fn add_instance(&mut self, name: impl Into<String>, instance: Arc<T>, prepend: bool) -> &mut Self {
        self.insert(Entry::ready(name.into(), instance), prepend)
    }

    fn insert(&mut self, entry: Entry<T>, prepend: bool) -> &mut Self {
        let existing = self.position(&entry.name);
        match (existing, prepend) {
            (Some(index), false) => self.entries[index] = entry,
            (Some(index), true) => {
                self.entries.remove(index);
                self.entries.insert(0, entry);
            }
            (None, false) => self.entries.push(entry),
            (None, true) => self.entries.insert(0, entry),
        }
        self
    }

    /// Removes the entry registered under `name`. Absent names are ignored,
    /// and the fallback entry cannot be removed.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        if name == DEFAULT_NAME {
            tracing::warn!(category = self.category, "refusing to remove the fallback entry");
            return false;
        }
        match self.position(name) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the component registered under `name`, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownComponent`] if `name` is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.position(name)
            .map(|index| self.entries[index].materialize())
            .ok_or_else(|| RegistryError::UnknownComponent {
                category: self.category,
                name: name.to_string(),
            })
    }

    /// Returns the fallback component.
    ///
    /// # Panics
    ///
    /// Never in practice: the fallback entry is created by every constructor
    /// and [`Registry::remove`] refuses to delete it.
    #[must_use]
    pub fn fallback(&self) -> Arc<T> {
        match self.position(DEFAULT_NAME) {
            Some(index) => self.entries[index].materialize(),
            None => unreachable!("{} registry lost its fallback entry", self.category),
        }
    }

    /// Reverse lookup: the name under which `instance` is registered.
    ///
    /// Compares by identity against entries that have already been
    /// materialized. The fallback slot is skipped, so a component registered
    /// both as default and under a real name reports the real name.
    #[must_use]
    pub fn name_of(&self, instance: &Arc<T>) -> Option<&str> {
        let target = Arc::as_ptr(instance).cast::<()>();
        self.named_entries()
            .find(|entry| {
                entry
                    .instance()
                    .is_some_and(|held| Arc::as_ptr(held).cast::<()>() == target)
            })
            .map(|entry| entry.name.as_str())
    }

    /// Reverse lookup by factory identity, for entries not yet materialized.
    #[must_use]
    pub fn name_of_factory(&self, factory: &Factory<T>) -> Option<&str> {
        let target = Arc::as_ptr(factory).cast::<()>();
        self.named_entries()
            .find(|entry| {
                entry
                    .factory()
                    .is_some_and(|held| Arc::as_ptr(held).cast::<()>() == target)
            })
            .map(|entry| entry.name.as_str())
    }

    fn named_entries(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries.iter().filter(|entry| entry.name != DEFAULT_NAME)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Whether the entry under `name` has been built yet.
    #[must_use]
    pub fn is_materialized(&self, name: &str) -> bool {
        self.position(name)
            .is_some_and(|index| self.entries[index].instance().is_some())
    }

    /// Registered names in iteration order, including the fallback slot.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Resolves every entry in iteration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Arc<T>)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.materialize()))
    }

    /// Number of entries, including the fallback slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`: the fallback entry is permanent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("category", &self.category)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Wraps a constructor closure as a [`Factory`].
pub fn factory<T: ?Sized, F>(build: F) -> Factory<T>
where
    F: Fn() -> Arc<T> + Send + Sync + 'static,
{
    Arc::new(build)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    trait Named: Send + Sync {
        fn label(&self) -> String;
    }

    struct Plain(&'static str);

    impl Named for Plain {
        fn label(&self) -> String {
            self.0.to_string()
        }
    }

    fn plain(label: &'static str) -> Factory<dyn Named> {
        factory(move || Arc::new(Plain(label)) as Arc<dyn Named>)
    }

    fn counting(label: &'static str, builds: Arc<AtomicUsize>) -> Factory<dyn Named> {
        factory(move || {
            builds.fetch_add(1, Ordering::SeqCst);
            Arc::new(Plain(label)) as Arc<dyn Named>
        })
    }

    fn labels(registry: &Registry<dyn Named>) -> Vec<String> {
        registry.iter().map(|(_, c)| c.label()).collect()
    }

    #[test]
    fn fallback_entry_is_always_present() {
        let registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        assert!(registry.contains(DEFAULT_NAME));
        assert_eq!(registry.fallback().label(), "default");
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }

    #[test]
    fn fallback_entry_cannot_be_removed() {
        let mut registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        assert!(!registry.remove(DEFAULT_NAME));
        assert!(registry.contains(DEFAULT_NAME));
    }

    #[test]
    fn resolve_builds_once_and_caches() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        registry.add("a", counting("a", Arc::clone(&builds)), false);

        assert!(!registry.is_materialized("a"));
        let first = registry.resolve("a").unwrap();
        let second = registry.resolve("a").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(registry.is_materialized("a"));
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        let err = registry.resolve("nope").err().unwrap();
        assert_eq!(
            err,
            RegistryError::UnknownComponent {
                category: "widget",
                name: "nope".to_string(),
            }
        );
        assert_eq!(err.to_string(), "unknown widget: 'nope'");
    }

    #[test]
    fn add_appends_and_prepend_moves_to_front() {
        let mut registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        registry.add("a", plain("a"), false);
        registry.add("b", plain("b"), true);
        assert_eq!(labels(&registry), vec!["b", "default", "a"]);
    }

    #[test]
    fn overwrite_keeps_position_unless_prepended() {
        let mut registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        registry.add("a", plain("a"), false);
        registry.add("b", plain("b"), false);

        registry.add("a", plain("a2"), false);
        assert_eq!(labels(&registry), vec!["default", "a2", "b"]);

        registry.add("b", plain("b2"), true);
        assert_eq!(labels(&registry), vec!["b2", "default", "a2"]);
    }

    #[test]
    fn remove_absent_name_is_silent() {
        let mut registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        registry.add("a", plain("a"), false);
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(!registry.contains("a"));
    }

    #[test]
    fn name_of_skips_fallback_slot() {
        let shared: Arc<dyn Named> = Arc::new(Plain("shared"));
        let mut registry: Registry<dyn Named> =
            Registry::with_default_instance("widget", Arc::clone(&shared));
        registry.add_instance("real", Arc::clone(&shared), false);

        assert_eq!(registry.name_of(&shared), Some("real"));
    }

    #[test]
    fn name_of_unregistered_instance_is_none() {
        let registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        let stranger: Arc<dyn Named> = Arc::new(Plain("x"));
        assert_eq!(registry.name_of(&stranger), None);
    }

    #[test]
    fn name_of_factory_matches_by_identity() {
        let fac = plain("a");
        let mut registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        registry.add("a", Arc::clone(&fac), false);

        assert_eq!(registry.name_of_factory(&fac), Some("a"));
        assert_eq!(registry.name_of_factory(&plain("a")), None);
    }

    #[test]
    fn instance_entries_are_returned_unchanged() {
        let instance: Arc<dyn Named> = Arc::new(Plain("ready"));
        let mut registry: Registry<dyn Named> = Registry::new("widget", plain("default"));
        registry.add_instance("ready", Arc::clone(&instance), false);

        assert!(registry.is_materialized("ready"));
        assert!(Arc::ptr_eq(&registry.resolve("ready").unwrap(), &instance));
    }
}
