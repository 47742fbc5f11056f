//! Changeward core library.
//!
//! Coordinates processes sharing one store so that each change unit in a
//! catalog runs exactly once: a lease-based lock guards the run, and change
//! entries record what has already been applied.

pub mod change;
pub mod config;
pub mod driver;
pub mod entry;
pub mod errors;
pub mod executor;
pub mod keys;
pub mod legacy;
pub mod lock;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod types;

pub use change::{ChangeCatalog, ChangeContext, ChangeUnit, ChangeUnitDescriptor};
pub use config::{LockSettings, MigrationConfig};
pub use driver::{ConnectionDriver, ForbiddenParametersMap, MemoryDriver, RedisDriver};
pub use entry::{ChangeEntryRepository, ChangeEntryService};
pub use errors::*;
pub use executor::{MigrationExecutor, MigrationReport, RunState};
pub use legacy::{LegacyMigration, LegacyMigrationMappingFields};
pub use lock::{LockManager, LockRepository};
pub use registry::{ChangeSetDependency, Dependencies};
pub use runner::{Runner, RunnerBuilder, start};
pub use types::{ChangeEntry, ChangeState, ChangeUnitKey, LockEntry, SystemVersion};

pub use redis;
pub use redis::aio::ConnectionManager;
