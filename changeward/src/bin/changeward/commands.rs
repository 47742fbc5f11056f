use anyhow::{Context, Result};
use clap::Subcommand;

use changeward::{
    ChangeState, ChangeUnitKey, ConnectionDriver, LockRepository, LockSettings, RedisDriver,
};

use crate::output::{EntryList, OutputManager, StatusReport, describe_lock};

#[derive(Subcommand)]
pub enum Commands {
    /// Show the lock holder and the latest entry of every change unit
    Status,

    /// List every recorded change entry, oldest first
    History,

    /// Manually mark a change unit as applied or rolled back
    Resolve {
        /// Change unit id
        change_id: String,

        /// Change unit author
        author: String,

        /// Mark the change unit as applied
        #[arg(long, conflicts_with = "rolled_back", required_unless_present = "rolled_back")]
        applied: bool,

        /// Mark the change unit as rolled back
        #[arg(long, conflicts_with = "applied")]
        rolled_back: bool,

        /// Write the entry even if a migration run holds the lock
        #[arg(long)]
        force: bool,
    },
}

/// Connection settings shared by every subcommand.
pub struct Connection<'a> {
    pub redis_url: &'a str,
    pub prefix: &'a str,
}

impl Connection<'_> {
    async fn driver(&self) -> Result<RedisDriver> {
        let driver = RedisDriver::connect(self.redis_url, self.prefix, LockSettings::default())
            .await
            .with_context(|| format!("Failed to connect to {}", self.redis_url))?;
        driver.initialize().await.context("Failed to initialize change tracking")?;
        Ok(driver)
    }
}

pub async fn handle_command(command: Commands, connection: &Connection<'_>, output: &OutputManager) -> Result<()> {
    let driver = connection.driver().await?;
    match command {
        Commands::Status => handle_status(&driver, output).await,
        Commands::History => handle_history(&driver, output).await,
        Commands::Resolve {
            change_id,
            author,
            applied,
            rolled_back: _,
            force,
        } => {
            let state = if applied {
                ChangeState::Executed
            } else {
                ChangeState::RolledBack
            };
            handle_resolve(&driver, ChangeUnitKey::new(change_id, author), state, force, output).await
        }
    }
}

async fn handle_status(driver: &RedisDriver, output: &OutputManager) -> Result<()> {
    let lock = driver
        .lock_repository()
        .find(driver.lock_manager().lock_key())
        .await
        .context("Failed to read the lock")?;
    let entries = driver.change_entry_service().entries().await?;

    output.heading("Lock");
    output.key_value(driver.lock_manager().lock_key(), &describe_lock(lock.as_ref()));
    output.heading("Change units");
    let count = entries.len();
    output.display(&StatusReport {
        lock,
        entries: EntryList(entries),
    })?;
    output.info(&format!("{count} change unit(s) tracked"));
    Ok(())
}

async fn handle_history(driver: &RedisDriver, output: &OutputManager) -> Result<()> {
    let history = driver.change_entry_service().history().await?;
    output.heading("Change history");
    output.display(&EntryList(history))
}

async fn handle_resolve(
    driver: &RedisDriver,
    key: ChangeUnitKey,
    state: ChangeState,
    force: bool,
    output: &OutputManager,
) -> Result<()> {
    let entry = if force {
        output.warning("Writing without the lock; a running migration may overwrite this entry.");
        driver.change_entry_service().resolve(&key, state).await?
    } else {
        match driver.resolve_change(&key, state).await {
            Ok(entry) => entry,
            Err(err) if err.is_lock_not_available() => {
                anyhow::bail!("{err}; a migration run holds the lock, retry once it finishes or pass --force")
            }
            Err(err) => return Err(err.into()),
        }
    };
    output.success(&format!("{key} marked as {state}"));
    output.display(&EntryList(vec![entry]))
}
