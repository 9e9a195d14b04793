//! Migration plans.
//!
//! A [`MigrationPlan`] is the ordered list of steps the executor will run.
//! Plans are computed from the known migrations and the versions already in
//! the version log, without touching the database.

use std::collections::{BTreeSet, HashSet};

use phinx_rs_core::{PhinxError, PhinxResult};
use phinx_rs_db_adapters::{Direction, Migration};

/// A single step in a migration plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    /// The migration version.
    pub version: i64,
    /// The migration name.
    pub name: String,
    /// Whether the migration is applied or reverted.
    pub direction: Direction,
}

impl MigrationStep {
    /// Creates a step that applies a migration.
    pub fn up(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            direction: Direction::Up,
        }
    }

    /// Creates a step that reverts a migration.
    pub fn down(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            direction: Direction::Down,
        }
    }
}

/// The ordered steps to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    /// The steps, in execution order.
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Adds a step to the plan.
    pub fn add_step(&mut self, step: MigrationStep) {
        self.steps.push(step);
    }

    /// Returns whether the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns the versions touched, in execution order.
    pub fn versions(&self) -> Vec<i64> {
        self.steps.iter().map(|s| s.version).collect()
    }
}

/// Fails if two migrations share a version.
pub fn check_unique_versions(migrations: &[Box<dyn Migration>]) -> PhinxResult<()> {
    let mut seen = HashSet::new();
    for m in migrations {
        if !seen.insert(m.version()) {
            return Err(PhinxError::MigrationError(format!(
                "Duplicate migration version {} ({})",
                m.version(),
                m.name()
            )));
        }
    }
    Ok(())
}

/// Plans every pending migration up to and including `target`, ascending.
///
/// With no target, every pending migration is planned.
pub fn plan_migrate(
    migrations: &[Box<dyn Migration>],
    applied: &BTreeSet<i64>,
    target: Option<i64>,
) -> PhinxResult<MigrationPlan> {
    check_unique_versions(migrations)?;

    let mut pending: Vec<&dyn Migration> = migrations
        .iter()
        .map(AsRef::as_ref)
        .filter(|m| !applied.contains(&m.version()))
        .filter(|m| target.map_or(true, |t| m.version() <= t))
        .collect();
    pending.sort_by_key(|m| m.version());

    let mut plan = MigrationPlan::new();
    for m in pending {
        plan.add_step(MigrationStep::up(m.version(), m.name()));
    }
    Ok(plan)
}

/// Plans reverting applied migrations newer than `target`, descending.
///
/// With no target, only the most recently applied version is reverted.
/// Every version reverted must have a matching migration.
pub fn plan_rollback(
    migrations: &[Box<dyn Migration>],
    applied: &BTreeSet<i64>,
    target: Option<i64>,
) -> PhinxResult<MigrationPlan> {
    check_unique_versions(migrations)?;

    let versions: Vec<i64> = match target {
        None => applied.iter().next_back().copied().into_iter().collect(),
        Some(t) => applied.iter().rev().copied().filter(|v| *v > t).collect(),
    };

    let mut plan = MigrationPlan::new();
    for version in versions {
        let m = migrations
            .iter()
            .find(|m| m.version() == version)
            .ok_or_else(|| {
                PhinxError::MigrationError(format!(
                    "Applied version {version} has no matching migration"
                ))
            })?;
        plan.add_step(MigrationStep::down(version, m.name()));
    }
    Ok(plan)
}
