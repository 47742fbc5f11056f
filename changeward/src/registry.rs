use std::{
    any::{Any, type_name},
    collections::BTreeMap,
    fmt,
    sync::Arc,
};

/// A named resource a driver lends to change units, e.g. a connection handle.
#[derive(Clone)]
pub struct ChangeSetDependency {
    pub name: String,
    pub type_name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
}

impl ChangeSetDependency {
    pub fn new<T>(name: impl Into<String>, instance: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            type_name: type_name::<T>(),
            instance: Arc::new(instance),
        }
    }

    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }
}

impl fmt::Debug for ChangeSetDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSetDependency")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Dependencies available to change units during a run, keyed by name.
///
/// Built explicitly by the driver and the caller; there is no global registry.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    by_name: BTreeMap<String, ChangeSetDependency>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a dependency.
    pub fn register(&mut self, dependency: ChangeSetDependency) {
        self.by_name.insert(dependency.name.clone(), dependency);
    }

    pub fn with<T>(mut self, name: impl Into<String>, instance: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.register(ChangeSetDependency::new(name, instance));
        self
    }

    /// Later registrations in `other` win over ours.
    pub fn merged(&self, other: &Dependencies) -> Dependencies {
        let mut merged = self.clone();
        for dependency in other.by_name.values() {
            merged.register(dependency.clone());
        }
        merged
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.by_name.get(name).and_then(|dependency| dependency.downcast::<T>())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
