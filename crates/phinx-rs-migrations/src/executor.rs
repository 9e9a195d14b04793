//! Migration execution.
//!
//! The [`MigrationExecutor`] owns the project's migrations and applies or
//! reverts them through any [`Adapter`]. Each step runs inside a transaction
//! when the adapter supports one:
//!
//! 1. begin
//! 2. run `up` or `down`
//! 3. record the step in the version log
//! 4. commit, or roll back on failure and return the original error

use std::collections::BTreeSet;

use chrono::Utc;
use phinx_rs_core::logging::migration_span;
use phinx_rs_core::{PhinxError, PhinxResult};
use phinx_rs_db_adapters::{Adapter, Direction, Migration};
use tracing::Instrument;

use crate::plan::{self, MigrationPlan, MigrationStep};

/// Applies and reverts a set of migrations.
pub struct MigrationExecutor {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationExecutor {
    /// Creates an executor. Fails if two migrations share a version.
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> PhinxResult<Self> {
        plan::check_unique_versions(&migrations)?;
        Ok(Self { migrations })
    }

    /// Returns the known migrations.
    pub fn migrations(&self) -> &[Box<dyn Migration>] {
        &self.migrations
    }

    /// Plans the pending migrations up to `target` without running them.
    pub async fn plan_migrate(
        &self,
        adapter: &mut dyn Adapter,
        target: Option<i64>,
    ) -> PhinxResult<MigrationPlan> {
        let applied = applied_versions(adapter).await?;
        plan::plan_migrate(&self.migrations, &applied, target)
    }

    /// Plans a rollback to `target` without running it.
    pub async fn plan_rollback(
        &self,
        adapter: &mut dyn Adapter,
        target: Option<i64>,
    ) -> PhinxResult<MigrationPlan> {
        let applied = applied_versions(adapter).await?;
        plan::plan_rollback(&self.migrations, &applied, target)
    }

    /// Runs every pending migration up to `target` (all when `None`),
    /// ascending. Returns the plan that was executed.
    pub async fn migrate(
        &self,
        adapter: &mut dyn Adapter,
        target: Option<i64>,
    ) -> PhinxResult<MigrationPlan> {
        let plan = self.plan_migrate(adapter, target).await?;
        self.execute_plan(adapter, &plan).await?;
        Ok(plan)
    }

    /// Reverts applied migrations newer than `target`, descending. With no
    /// target only the latest is reverted. Returns the plan that was executed.
    pub async fn rollback(
        &self,
        adapter: &mut dyn Adapter,
        target: Option<i64>,
    ) -> PhinxResult<MigrationPlan> {
        let plan = self.plan_rollback(adapter, target).await?;
        self.execute_plan(adapter, &plan).await?;
        Ok(plan)
    }

    /// Executes a plan step by step, stopping at the first failure.
    pub async fn execute_plan(
        &self,
        adapter: &mut dyn Adapter,
        plan: &MigrationPlan,
    ) -> PhinxResult<()> {
        if plan.is_empty() {
            tracing::info!(adapter = adapter.adapter_name(), "Nothing to migrate");
            return Ok(());
        }
        for step in &plan.steps {
            let migration = self.find(step)?;
            let span = migration_span(step.version, &step.name, step.direction.as_str());
            run_step(adapter, migration, step.direction)
                .instrument(span)
                .await?;
        }
        Ok(())
    }

    fn find(&self, step: &MigrationStep) -> PhinxResult<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.version() == step.version)
            .map(AsRef::as_ref)
            .ok_or_else(|| {
                PhinxError::MigrationError(format!(
                    "No migration with version {}",
                    step.version
                ))
            })
    }
}

async fn applied_versions(adapter: &mut dyn Adapter) -> PhinxResult<BTreeSet<i64>> {
    adapter.connect().await?;
    Ok(adapter.get_versions().await?.into_iter().collect())
}

async fn run_step(
    adapter: &mut dyn Adapter,
    migration: &dyn Migration,
    direction: Direction,
) -> PhinxResult<()> {
    let transactional = adapter.has_transactions();
    if transactional {
        adapter.begin_transaction().await?;
    }

    let start = Utc::now();
    tracing::info!("Migrating");
    let mut result = match direction {
        Direction::Up => migration.up(adapter).await,
        Direction::Down => migration.down(adapter).await,
    };
    if result.is_ok() {
        result = adapter
            .record_migration(migration, direction, start, Utc::now())
            .await;
    }

    match result {
        Ok(()) => {
            if transactional {
                adapter.commit_transaction().await?;
            }
            let elapsed = Utc::now() - start;
            tracing::info!(elapsed_ms = elapsed.num_milliseconds(), "Migrated");
            Ok(())
        }
        Err(e) => {
            if transactional {
                if let Err(rollback) = adapter.rollback_transaction().await {
                    tracing::warn!(error = %rollback, "Rollback after failed migration failed");
                }
            }
            tracing::error!(error = %e, "Migration failed");
            Err(e)
        }
    }
}
