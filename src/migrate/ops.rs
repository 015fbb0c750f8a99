//! The statement surface handed to migration actions.
//!
//! Every call goes through the one transaction the engine opened for the
//! migration, so a failing action leaves nothing behind.

use std::sync::Arc;

use crate::ast::{
    AlterTable, CreateTable, DropConstraint, DropTable, ForeignKey, Insert, TableKey, Value,
};
use crate::error::StratumResult;
use crate::executor::{Executor, Row, Tx};
use crate::transpiler::ddl;

/// Transaction-bound schema and data operations.
#[derive(Clone)]
pub struct SchemaOps {
    executor: Arc<dyn Executor>,
    tx: Tx,
}

impl SchemaOps {
    pub(crate) fn new(executor: Arc<dyn Executor>, tx: Tx) -> Self {
        Self { executor, tx }
    }

    /// The transaction every statement here runs on.
    pub fn tx(&self) -> Tx {
        self.tx
    }

    pub async fn create_table(&self, ast: CreateTable) -> StratumResult<()> {
        self.executor
            .execute(&ddl::build_create_table(&ast), &[], Some(self.tx))
            .await?;
        Ok(())
    }

    pub async fn drop_table(&self, table: impl Into<String>) -> StratumResult<()> {
        let ast = DropTable::new(table);
        self.executor
            .execute(&ddl::build_drop_table(&ast), &[], Some(self.tx))
            .await?;
        Ok(())
    }

    pub async fn alter_table(&self, ast: AlterTable) -> StratumResult<()> {
        self.executor
            .execute(&ddl::build_alter_table(&ast), &[], Some(self.tx))
            .await?;
        Ok(())
    }

    pub async fn foreign_key(&self, foreign: TableKey, reference: TableKey) -> StratumResult<()> {
        let ast = ForeignKey { foreign, reference };
        self.executor
            .execute(&ddl::build_foreign_key(&ast), &[], Some(self.tx))
            .await?;
        Ok(())
    }

    pub async fn drop_constraint(
        &self,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> StratumResult<()> {
        let ast = DropConstraint {
            table: table.into(),
            column: column.into(),
        };
        self.executor
            .execute(&ddl::build_drop_constraint(&ast), &[], Some(self.tx))
            .await?;
        Ok(())
    }

    pub async fn insert(&self, ast: Insert) -> StratumResult<()> {
        self.executor
            .execute(&ddl::build_insert(&ast), &[], Some(self.tx))
            .await?;
        Ok(())
    }

    /// Raw escape hatch for statements the ASTs do not cover.
    pub async fn execute(&self, sql: &str, values: &[Value]) -> StratumResult<u64> {
        self.executor.execute(sql, values, Some(self.tx)).await
    }

    /// Raw row-returning escape hatch.
    pub async fn query(&self, sql: &str, values: &[Value]) -> StratumResult<Vec<Row>> {
        self.executor.query(sql, values, Some(self.tx)).await
    }
}
