//! Migration engine.
//!
//! Orders registered migration definitions by their timestamp prefix,
//! tracks what has been applied in a tracking table, and applies or
//! reverts each migration inside its own transaction. A failure rolls the
//! current transaction back and halts the rest of the queue; nothing is
//! retried.

pub mod migration;
pub mod ops;

use std::sync::Arc;

use crate::ast::{ColumnDef, ColumnType, CreateTable, Value};
use crate::error::{StratumError, StratumResult};
use crate::executor::{Executor, Tx};
use crate::transpiler::{ddl, quote_ident};

pub use self::migration::{Direction, Migration, MigrationAction};
pub use self::ops::SchemaOps;

const TRACKING_TABLE: &str = "migrations";

/// Lifecycle of one migration within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Known but not selected by this run (e.g. already applied).
    Discovered,
    /// Selected but not reached.
    Pending,
    /// Currently inside its transaction.
    Applying,
    /// Finished and recorded.
    Applied,
    /// Its transaction was rolled back.
    Failed,
}

/// Per-migration outcome of a run.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub name: String,
    pub state: MigrationState,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub direction: Direction,
    pub statuses: Vec<MigrationStatus>,
}

impl RunReport {
    /// How many migrations this run applied (or reverted).
    pub fn applied(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| s.state == MigrationState::Applied)
            .count()
    }

    /// How many selected migrations were left unreached.
    pub fn pending(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| s.state == MigrationState::Pending)
            .count()
    }
}

/// The migration runner: an executor plus the registered definitions.
pub struct Runner {
    executor: Arc<dyn Executor>,
    table: String,
    migrations: Vec<Migration>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("table", &self.table)
            .field(
                "migrations",
                &self.migrations.iter().map(Migration::name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Validate and order the registered definitions.
    ///
    /// Every name must carry a parseable ordering key and be unique;
    /// ordering is ascending by (key, name).
    pub fn new(executor: Arc<dyn Executor>, migrations: Vec<Migration>) -> StratumResult<Self> {
        let mut keyed: Vec<(i64, Migration)> = Vec::with_capacity(migrations.len());
        for m in migrations {
            let key = migration::ordering_key(m.name())?;

            if keyed.iter().any(|(_, other)| other.name() == m.name()) {
                return Err(StratumError::MigrationLoad(format!(
                    "migration '{}' is registered twice",
                    m.name()
                )));
            }

            keyed.push((key, m));
        }

        keyed.sort_by(|(ka, ma), (kb, mb)| ka.cmp(kb).then_with(|| ma.name().cmp(mb.name())));

        Ok(Self {
            executor,
            table: TRACKING_TABLE.to_string(),
            migrations: keyed.into_iter().map(|(_, m)| m).collect(),
        })
    }

    /// Override the tracking table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Apply every registered migration that is not yet recorded.
    pub async fn up(&self) -> StratumResult<RunReport> {
        self.run(Direction::Up, usize::MAX).await
    }

    /// Revert the most recently applied migration.
    pub async fn down(&self) -> StratumResult<RunReport> {
        self.run(Direction::Down, 1).await
    }

    /// Revert the `count` most recently applied migrations, newest first.
    pub async fn down_many(&self, count: usize) -> StratumResult<RunReport> {
        self.run(Direction::Down, count).await
    }

    async fn run(&self, direction: Direction, count: usize) -> StratumResult<RunReport> {
        self.ensure_table().await?;
        let applied = self.applied_names().await?;

        let queue: Vec<&Migration> = match direction {
            Direction::Up => self
                .migrations
                .iter()
                .filter(|m| !applied.iter().any(|name| name == m.name()))
                .take(count)
                .collect(),
            Direction::Down => {
                // most recently applied first; a recorded name without a
                // definition means code and tracking table have drifted
                let start = applied.len().saturating_sub(count);
                let mut queue = Vec::new();
                for name in applied[start..].iter().rev() {
                    let found = self
                        .migrations
                        .iter()
                        .find(|m| m.name() == name)
                        .ok_or_else(|| {
                            StratumError::MigrationLoad(format!(
                                "definition of applied migration '{}' has been deleted",
                                name
                            ))
                        })?;
                    queue.push(found);
                }
                queue
            }
        };

        let mut report = RunReport {
            direction,
            statuses: self
                .migrations
                .iter()
                .map(|m| MigrationStatus {
                    name: m.name().to_string(),
                    state: if queue.iter().any(|q| q.name() == m.name()) {
                        MigrationState::Pending
                    } else {
                        MigrationState::Discovered
                    },
                })
                .collect(),
        };

        if queue.is_empty() {
            tracing::info!(direction = %direction, "no migrations to run");
            return Ok(report);
        }

        for migration in queue {
            tracing::info!(migration = migration.name(), direction = %direction, "applying");
            self.set_state(&mut report, migration.name(), MigrationState::Applying);

            match self.apply(migration, direction).await {
                Ok(()) => {
                    tracing::info!(migration = migration.name(), direction = %direction, "completed");
                    self.set_state(&mut report, migration.name(), MigrationState::Applied);
                }
                Err(err) => {
                    tracing::error!(
                        migration = migration.name(),
                        error = %err,
                        "migration failed, halting run"
                    );
                    self.set_state(&mut report, migration.name(), MigrationState::Failed);
                    return Err(err);
                }
            }
        }

        Ok(report)
    }

    fn set_state(&self, report: &mut RunReport, name: &str, state: MigrationState) {
        if let Some(status) = report.statuses.iter_mut().find(|s| s.name == name) {
            status.state = state;
        }
    }

    /// Run one migration's action and its tracking-row change inside a
    /// single transaction.
    async fn apply(&self, migration: &Migration, direction: Direction) -> StratumResult<()> {
        let name = migration.name().to_string();
        let action = migration.action(direction).ok_or_else(|| {
            StratumError::MigrationLoad(format!(
                "migration '{}' has no {} action",
                name, direction
            ))
        })?;

        let tx = self.executor.begin().await?;
        let ops = SchemaOps::new(self.executor.clone(), tx);

        let result = self.apply_in_tx(action, ops, &name, direction, tx).await;

        match result {
            Ok(()) => self.executor.commit(tx).await.map_err(|e| {
                StratumError::MigrationApply {
                    name,
                    source: Box::new(e),
                }
            }),
            Err(err) => {
                if let Err(rollback_err) = self.executor.rollback(tx).await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(StratumError::MigrationApply {
                    name,
                    source: Box::new(err),
                })
            }
        }
    }

    async fn apply_in_tx(
        &self,
        action: &MigrationAction,
        ops: SchemaOps,
        name: &str,
        direction: Direction,
        tx: Tx,
    ) -> StratumResult<()> {
        action(ops).await?;

        let sql = match direction {
            Direction::Up => format!(
                "INSERT INTO {} ({}, {}) VALUES (?, now())",
                quote_ident(&self.table),
                quote_ident("name"),
                quote_ident("run_on"),
            ),
            Direction::Down => format!(
                "DELETE FROM {} WHERE {} = ?",
                quote_ident(&self.table),
                quote_ident("name"),
            ),
        };

        self.executor
            .execute(&sql, &[Value::String(name.to_string())], Some(tx))
            .await?;
        Ok(())
    }

    /// Idempotent create-if-absent for the tracking table.
    async fn ensure_table(&self) -> StratumResult<()> {
        let ast = CreateTable::new(self.table.as_str())
            .if_not_exists()
            .column("id", ColumnDef::new(ColumnType::Serial).primary_key())
            .column(
                "name",
                ColumnDef::new(ColumnType::Varchar(Some(255)))
                    .unique()
                    .not_null(),
            )
            .column("run_on", ColumnDef::new(ColumnType::Timestamptz).not_null());

        self.executor
            .execute(&ddl::build_create_table(&ast), &[], None)
            .await?;
        Ok(())
    }

    /// Names already recorded, in application order.
    async fn applied_names(&self) -> StratumResult<Vec<String>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}, {}",
            quote_ident("name"),
            quote_ident(&self.table),
            quote_ident("run_on"),
            quote_ident("id"),
        );

        let rows = self.executor.query(&sql, &[], None).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect())
    }
}
