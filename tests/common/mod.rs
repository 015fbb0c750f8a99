//! Shared test doubles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stratum::StratumResult;
use stratum::ast::Value;
use stratum::executor::{Executor, Row, Tx};

/// One recorded executor call. Transaction control points are recorded as
/// `<begin>` / `<commit>` / `<rollback>` markers so tests can assert on
/// statement ordering across transactions.
#[derive(Debug, Clone)]
pub struct Call {
    pub sql: String,
    pub values: Vec<Value>,
    pub tx: Option<Tx>,
}

/// An [`Executor`] that records every call and replays canned responses.
#[derive(Default)]
pub struct MockExecutor {
    log: Mutex<Vec<Call>>,
    rows: Mutex<VecDeque<Vec<Row>>>,
    affected: Mutex<VecDeque<u64>>,
}

impl MockExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the row set returned by the next `query` call.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.rows.lock().unwrap().push_back(rows);
    }

    /// Queue the affected-row count returned by the next `execute` call.
    pub fn push_affected(&self, n: u64) {
        self.affected.lock().unwrap().push_back(n);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn sqls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.sql).collect()
    }

    /// Recorded statements without transaction markers.
    pub fn statements(&self) -> Vec<String> {
        self.sqls()
            .into_iter()
            .filter(|sql| !sql.starts_with('<'))
            .collect()
    }

    fn record(&self, sql: &str, values: &[Value], tx: Option<Tx>) {
        self.log.lock().unwrap().push(Call {
            sql: sql.to_string(),
            values: values.to_vec(),
            tx,
        });
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn query(&self, sql: &str, values: &[Value], tx: Option<Tx>) -> StratumResult<Vec<Row>> {
        self.record(sql, values, tx);
        Ok(self.rows.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn execute(&self, sql: &str, values: &[Value], tx: Option<Tx>) -> StratumResult<u64> {
        self.record(sql, values, tx);
        Ok(self.affected.lock().unwrap().pop_front().unwrap_or(0))
    }

    async fn begin(&self) -> StratumResult<Tx> {
        let tx = Tx::new();
        self.record("<begin>", &[], Some(tx));
        Ok(tx)
    }

    async fn commit(&self, tx: Tx) -> StratumResult<()> {
        self.record("<commit>", &[], Some(tx));
        Ok(())
    }

    async fn rollback(&self, tx: Tx) -> StratumResult<()> {
        self.record("<rollback>", &[], Some(tx));
        Ok(())
    }

    async fn ping(&self) -> StratumResult<()> {
        Ok(())
    }

    async fn close(&self) -> StratumResult<()> {
        Ok(())
    }
}

/// Build a row from a JSON object literal.
pub fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("rows are JSON objects, got {}", other),
    }
}
