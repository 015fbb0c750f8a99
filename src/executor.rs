//! The execute contract the core runs against.
//!
//! Everything above this trait — model runtime, join resolver, migration
//! engine — is driver-agnostic: it hands SQL with `?` placeholders plus an
//! ordered value list to an [`Executor`] and gets JSON-shaped rows back.
//! The crate ships one implementation ([`crate::engine::PgEngine`]); tests
//! substitute their own.

use async_trait::async_trait;
use uuid::Uuid;

use crate::ast::Value;
use crate::error::StratumResult;

/// A result row: column label to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Opaque transaction token.
///
/// A token is bound to exactly one held connection and is valid from
/// `begin` until exactly one of `commit`/`rollback`; reuse after
/// finalization is an error. Statements issued against one token are
/// serialized; concurrent use of the same token must be synchronized by
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tx(Uuid);

impl Tx {
    /// Mint a fresh token. Called by `Executor` implementations from
    /// `begin`; the core never creates tokens itself.
    pub fn new() -> Self {
        Tx(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for Tx {
    fn default() -> Self {
        Self::new()
    }
}

/// The pooled execute/transaction contract.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement and return its rows.
    async fn query(&self, sql: &str, values: &[Value], tx: Option<Tx>) -> StratumResult<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, values: &[Value], tx: Option<Tx>) -> StratumResult<u64>;

    /// Open a transaction on a dedicated connection.
    async fn begin(&self) -> StratumResult<Tx>;

    /// Commit and release the transaction's connection.
    async fn commit(&self, tx: Tx) -> StratumResult<()>;

    /// Roll back and release the transaction's connection.
    async fn rollback(&self, tx: Tx) -> StratumResult<()>;

    /// Cheap liveness check.
    async fn ping(&self) -> StratumResult<()>;

    /// Close the underlying pool.
    async fn close(&self) -> StratumResult<()>;
}
