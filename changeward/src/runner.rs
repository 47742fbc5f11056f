//! Entry point tying a driver, a configuration and a catalog together.

use log::info;

use crate::{
    change::ChangeCatalog,
    config::MigrationConfig,
    driver::ConnectionDriver,
    errors::{ConfigurationError, MigrationResult},
    executor::{MigrationExecutor, MigrationReport},
    registry::Dependencies,
};

/// A validated, ready-to-run migration.
///
/// Configuration is fixed once [`RunnerBuilder::build`] succeeds.
pub struct Runner<'d, D> {
    driver: &'d D,
    config: MigrationConfig,
    catalog: ChangeCatalog,
    dependencies: Dependencies,
}

impl<'d, D> Runner<'d, D>
where
    D: ConnectionDriver,
{
    pub fn builder() -> RunnerBuilder<'d, D> {
        RunnerBuilder::default()
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ChangeCatalog {
        &self.catalog
    }

    /// Initializes the driver's stores, then runs the executor to a terminal state.
    pub async fn execute(&self) -> MigrationResult<MigrationReport> {
        self.driver.initialize().await?;
        info!("running {} change unit(s)", self.catalog.len());
        MigrationExecutor::new(self.driver, self.config.clone())
            .with_dependencies(self.dependencies.clone())
            .run(&self.catalog)
            .await
    }
}

pub struct RunnerBuilder<'d, D> {
    driver: Option<&'d D>,
    config: MigrationConfig,
    catalog: ChangeCatalog,
    dependencies: Dependencies,
}

impl<D> Default for RunnerBuilder<'_, D> {
    fn default() -> Self {
        Self {
            driver: None,
            config: MigrationConfig::default(),
            catalog: ChangeCatalog::new(),
            dependencies: Dependencies::new(),
        }
    }
}

impl<'d, D> RunnerBuilder<'d, D>
where
    D: ConnectionDriver,
{
    pub fn driver(mut self, driver: &'d D) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(mut self, catalog: ChangeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Extra resources lent to change units, on top of the driver's.
    pub fn dependency<T>(mut self, name: impl Into<String>, instance: T) -> Self
    where
        T: std::any::Any + Send + Sync,
    {
        self.dependencies = self.dependencies.with(name, instance);
        self
    }

    pub fn dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Validates everything that can be checked without touching storage.
    pub fn build(self) -> Result<Runner<'d, D>, ConfigurationError> {
        let Some(driver) = self.driver else {
            return Err(ConfigurationError::single(
                "driver",
                "missing_driver",
                "a connection driver must be provided",
            ));
        };
        driver.run_validation(&self.config, &self.catalog, &self.dependencies)?;
        Ok(Runner {
            driver,
            config: self.config,
            catalog: self.catalog,
            dependencies: self.dependencies,
        })
    }
}

/// Validates and runs `catalog` against `driver` in one call.
pub async fn start<D>(config: MigrationConfig, driver: &D, catalog: ChangeCatalog) -> MigrationResult<MigrationReport>
where
    D: ConnectionDriver,
{
    Runner::builder()
        .driver(driver)
        .config(config)
        .catalog(catalog)
        .build()?
        .execute()
        .await
}
