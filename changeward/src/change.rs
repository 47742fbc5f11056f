//! Change units and the catalog handed to the executor.
//!
//! A change unit pairs a read-only [`ChangeUnitDescriptor`] with a delegate
//! that performs the actual mutation. The catalog is assembled by explicit
//! registration; nothing here discovers units at runtime.
//!
//! # Example
//! ```ignore
//! let mut catalog = ChangeCatalog::new();
//! catalog.push(ChangeUnit::new(
//!     ChangeUnitDescriptor::new("create-users", "ana", 1),
//!     |ctx: ChangeContext| async move {
//!         let conn = ctx.require::<ConnectionManager>("connection")?;
//!         // ...
//!         anyhow::Ok(())
//!     },
//! ));
//! ```

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    config::DEFAULT_START_SYSTEM_VERSION,
    registry::Dependencies,
    types::{ChangeUnitKey, SystemVersion},
};

pub type ChangeFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// The callable that performs a change unit's mutation.
pub trait ChangeDelegate: Send + Sync {
    fn execute(&self, ctx: ChangeContext) -> ChangeFuture;
}

impl<F, Fut> ChangeDelegate for F
where
    F: Fn(ChangeContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn execute(&self, ctx: ChangeContext) -> ChangeFuture {
        Box::pin(self(ctx))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeUnitDescriptor {
    pub id: String,
    pub author: String,
    pub order: i64,
    pub run_always: bool,
    /// Units that must have an EXECUTED entry before this one runs.
    pub depends_on: Vec<ChangeUnitKey>,
    pub system_version: String,
    /// Names of driver dependencies the delegate looks up.
    pub parameters: Vec<String>,
}

impl ChangeUnitDescriptor {
    pub fn new(id: impl Into<String>, author: impl Into<String>, order: i64) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            order,
            run_always: false,
            depends_on: Vec::new(),
            system_version: DEFAULT_START_SYSTEM_VERSION.to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn run_always(mut self) -> Self {
        self.run_always = true;
        self
    }

    pub fn depends_on(mut self, change_id: impl Into<String>, author: impl Into<String>) -> Self {
        self.depends_on.push(ChangeUnitKey::new(change_id, author));
        self
    }

    pub fn system_version(mut self, version: impl Into<String>) -> Self {
        self.system_version = version.into();
        self
    }

    pub fn parameter(mut self, name: impl Into<String>) -> Self {
        self.parameters.push(name.into());
        self
    }

    pub fn key(&self) -> ChangeUnitKey {
        ChangeUnitKey::new(&self.id, &self.author)
    }

    pub fn version(&self) -> SystemVersion {
        SystemVersion::parse(&self.system_version)
    }
}

#[derive(Clone)]
pub struct ChangeUnit {
    pub descriptor: ChangeUnitDescriptor,
    delegate: Arc<dyn ChangeDelegate>,
}

impl ChangeUnit {
    pub fn new<D>(descriptor: ChangeUnitDescriptor, delegate: D) -> Self
    where
        D: ChangeDelegate + 'static,
    {
        Self {
            descriptor,
            delegate: Arc::new(delegate),
        }
    }

    pub fn key(&self) -> ChangeUnitKey {
        self.descriptor.key()
    }

    pub(crate) fn execute(&self, ctx: ChangeContext) -> ChangeFuture {
        self.delegate.execute(ctx)
    }
}

impl fmt::Debug for ChangeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeUnit")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Ordered list of change units as registered by the host.
#[derive(Debug, Clone, Default)]
pub struct ChangeCatalog {
    units: Vec<ChangeUnit>,
}

impl ChangeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: ChangeUnit) {
        self.units.push(unit);
    }

    pub fn with<D>(mut self, descriptor: ChangeUnitDescriptor, delegate: D) -> Self
    where
        D: ChangeDelegate + 'static,
    {
        self.push(ChangeUnit::new(descriptor, delegate));
        self
    }

    pub fn units(&self) -> &[ChangeUnit] {
        &self.units
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ChangeUnitDescriptor> {
        self.units.iter().map(|unit| &unit.descriptor)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl FromIterator<ChangeUnit> for ChangeCatalog {
    fn from_iter<I: IntoIterator<Item = ChangeUnit>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

/// What a delegate sees while it runs.
#[derive(Debug, Clone)]
pub struct ChangeContext {
    key: ChangeUnitKey,
    execution_id: String,
    metadata: Arc<Map<String, Value>>,
    dependencies: Dependencies,
}

impl ChangeContext {
    pub(crate) fn new(
        key: ChangeUnitKey,
        execution_id: String,
        metadata: Arc<Map<String, Value>>,
        dependencies: Dependencies,
    ) -> Self {
        Self {
            key,
            execution_id,
            metadata,
            dependencies,
        }
    }

    pub fn key(&self) -> &ChangeUnitKey {
        &self.key
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn dependency<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: std::any::Any + Send + Sync,
    {
        self.dependencies.get(name)
    }

    /// Like [`ChangeContext::dependency`], failing with a descriptive error when absent.
    pub fn require<T>(&self, name: &str) -> anyhow::Result<Arc<T>>
    where
        T: std::any::Any + Send + Sync,
    {
        self.dependencies.get(name).ok_or_else(|| {
            anyhow::anyhow!(
                "dependency '{name}' of type {} is not available to {}",
                std::any::type_name::<T>(),
                self.key
            )
        })
    }
}
