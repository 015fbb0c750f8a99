//! Postgres implementation of the execute contract, built on sqlx.
//!
//! The engine owns a connection pool and a registry of live transactions.
//! Each transaction holds one pooled connection from `begin` until
//! `commit`/`rollback`; its token is the only way to reach it. Statements
//! arrive with `?` placeholders and are rewritten to `$n` here.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, Row as _, Transaction, TypeInfo};
use uuid::Uuid;

use crate::ast::Value;
use crate::config::{ConnectionConfig, Driver};
use crate::error::{StratumError, StratumResult};
use crate::executor::{Executor, Row, Tx};
use crate::transpiler::format_params;

type TxSlot = Arc<tokio::sync::Mutex<Transaction<'static, Postgres>>>;
type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// A pooled Postgres connection implementing [`Executor`].
pub struct PgEngine {
    pool: PgPool,
    txs: Mutex<HashMap<Uuid, TxSlot>>,
    debug: bool,
}

impl std::fmt::Debug for PgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEngine")
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Connect using the given configuration and verify the connection with a
/// ping. Configuration problems surface before any network traffic.
pub async fn connect(config: &ConnectionConfig) -> StratumResult<PgEngine> {
    let Driver::Postgres = config.driver()?;

    let options = match config {
        ConnectionConfig::Url {
            connection_string, ..
        } => PgConnectOptions::from_str(connection_string)
            .map_err(|e| StratumError::Config(format!("bad connection string: {}", e)))?,
        ConnectionConfig::Params {
            host,
            port,
            username,
            password,
            database,
            ..
        } => PgConnectOptions::new()
            .host(host)
            .port(*port)
            .username(username)
            .password(password)
            .database(database),
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| StratumError::Connection(e.to_string()))?;

    let engine = PgEngine {
        pool,
        txs: Mutex::new(HashMap::new()),
        debug: config.debug(),
    };

    engine.ping().await?;
    Ok(engine)
}

impl PgEngine {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn log(&self, sql: &str, values: &[Value]) {
        if self.debug {
            tracing::debug!(sql = %sql, values = ?values, "executing statement");
        }
    }

    fn tx_slot(&self, tx: Tx) -> StratumResult<TxSlot> {
        let txs = self
            .txs
            .lock()
            .map_err(|_| StratumError::Transaction("transaction registry poisoned".into()))?;

        txs.get(&tx.id())
            .cloned()
            .ok_or_else(|| StratumError::Transaction("unknown or already finalized transaction".into()))
    }

    fn take_tx(&self, tx: Tx) -> StratumResult<Transaction<'static, Postgres>> {
        let slot = {
            let mut txs = self
                .txs
                .lock()
                .map_err(|_| StratumError::Transaction("transaction registry poisoned".into()))?;
            txs.remove(&tx.id()).ok_or_else(|| {
                StratumError::Transaction("unknown or already finalized transaction".into())
            })?
        };

        Arc::try_unwrap(slot)
            .map_err(|_| StratumError::Transaction("transaction handle still in use".into()))
            .map(|m| m.into_inner())
    }
}

fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> StratumResult<PgQuery<'q>> {
    Ok(match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(n) => query.bind(*n),
        Value::Float(n) => query.bind(*n),
        Value::String(s) => query.bind(s.clone()),
        Value::Uuid(u) => query.bind(*u),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::Array(items) => bind_array(query, items)?,
    })
}

/// Arrays bind as a single typed parameter; the element type is taken
/// from the first element, and mixing types is an error. An empty array
/// binds as bigint[].
fn bind_array<'q>(query: PgQuery<'q>, items: &[Value]) -> StratumResult<PgQuery<'q>> {
    fn collect<T>(
        items: &[Value],
        pick: impl Fn(&Value) -> Option<T>,
    ) -> StratumResult<Vec<T>> {
        items
            .iter()
            .map(|item| {
                pick(item).ok_or_else(|| {
                    StratumError::Query("array parameter mixes element types".into())
                })
            })
            .collect()
    }

    Ok(match items.first() {
        None | Some(Value::Int(_)) => query.bind(collect(items, |v| match v {
            Value::Int(n) => Some(*n),
            _ => None,
        })?),
        Some(Value::String(_)) => query.bind(collect(items, |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })?),
        Some(Value::Uuid(_)) => query.bind(collect(items, |v| match v {
            Value::Uuid(u) => Some(*u),
            _ => None,
        })?),
        Some(Value::Bool(_)) => query.bind(collect(items, |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })?),
        Some(Value::Float(_)) => query.bind(collect(items, |v| match v {
            Value::Float(n) => Some(*n),
            _ => None,
        })?),
        Some(Value::Timestamp(_)) => query.bind(collect(items, |v| match v {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        })?),
        Some(Value::Null | Value::Array(_)) => {
            return Err(StratumError::Query(
                "array parameter has unbindable elements".into(),
            ));
        }
    })
}

/// Convert a PgRow into a JSON-shaped map, by column type.
fn row_to_map(row: &PgRow) -> Row {
    use sqlx::ValueRef;

    let mut map = Row::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name();

        let value_ref = row.try_get_raw(i);
        if value_ref.is_err() || value_ref.as_ref().map(|v| v.is_null()).unwrap_or(true) {
            map.insert(name, serde_json::Value::Null);
            continue;
        }

        let value: serde_json::Value = match type_name {
            "BOOL" => row
                .try_get::<bool, _>(i)
                .map(serde_json::Value::Bool)
                .unwrap_or(serde_json::Value::Null),
            "INT2" | "INT4" => row
                .try_get::<i32, _>(i)
                .map(|v| serde_json::Value::Number(v.into()))
                .unwrap_or(serde_json::Value::Null),
            "INT8" => row
                .try_get::<i64, _>(i)
                .map(|v| serde_json::Value::Number(v.into()))
                .unwrap_or(serde_json::Value::Null),
            "FLOAT4" => row
                .try_get::<f32, _>(i)
                .ok()
                .and_then(|v| serde_json::Number::from_f64(v as f64))
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            "FLOAT8" => row
                .try_get::<f64, _>(i)
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            "UUID" => row
                .try_get::<Uuid, _>(i)
                .map(|v| serde_json::Value::String(v.to_string()))
                .unwrap_or(serde_json::Value::Null),
            "TIMESTAMPTZ" | "TIMESTAMP" => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .map(|v| serde_json::Value::String(v.to_rfc3339()))
                .or_else(|_| {
                    row.try_get::<chrono::NaiveDateTime, _>(i)
                        .map(|v| serde_json::Value::String(v.to_string()))
                })
                .unwrap_or(serde_json::Value::Null),
            "DATE" => row
                .try_get::<chrono::NaiveDate, _>(i)
                .map(|v| serde_json::Value::String(v.to_string()))
                .unwrap_or(serde_json::Value::Null),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
                .try_get::<String, _>(i)
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            "JSONB" | "JSON" => row
                .try_get::<serde_json::Value, _>(i)
                .unwrap_or(serde_json::Value::Null),
            _ => row
                .try_get::<String, _>(i)
                .map(serde_json::Value::String)
                .unwrap_or_else(|_| serde_json::Value::String(format!("<{}>", type_name))),
        };

        map.insert(name, value);
    }

    map
}

#[async_trait]
impl Executor for PgEngine {
    async fn query(&self, sql: &str, values: &[Value], tx: Option<Tx>) -> StratumResult<Vec<Row>> {
        let sql = format_params(sql);
        self.log(&sql, values);

        match tx {
            None => {
                let mut query = sqlx::query(&sql);
                for value in values {
                    query = bind_value(query, value)?;
                }

                let rows = query
                    .fetch_all(&self.pool)
                    .await
                    .map_err(StratumError::query)?;
                Ok(rows.iter().map(row_to_map).collect())
            }
            Some(tx) => {
                let slot = self.tx_slot(tx)?;
                let mut conn = slot.try_lock().map_err(|_| {
                    StratumError::Transaction("transaction handle used concurrently".into())
                })?;

                let mut query = sqlx::query(&sql);
                for value in values {
                    query = bind_value(query, value)?;
                }

                let rows = query
                    .fetch_all(&mut **conn)
                    .await
                    .map_err(StratumError::query)?;
                Ok(rows.iter().map(row_to_map).collect())
            }
        }
    }

    async fn execute(&self, sql: &str, values: &[Value], tx: Option<Tx>) -> StratumResult<u64> {
        let sql = format_params(sql);
        self.log(&sql, values);

        match tx {
            None => {
                let mut query = sqlx::query(&sql);
                for value in values {
                    query = bind_value(query, value)?;
                }

                let result = query
                    .execute(&self.pool)
                    .await
                    .map_err(StratumError::query)?;
                Ok(result.rows_affected())
            }
            Some(tx) => {
                let slot = self.tx_slot(tx)?;
                let mut conn = slot.try_lock().map_err(|_| {
                    StratumError::Transaction("transaction handle used concurrently".into())
                })?;

                let mut query = sqlx::query(&sql);
                for value in values {
                    query = bind_value(query, value)?;
                }

                let result = query
                    .execute(&mut **conn)
                    .await
                    .map_err(StratumError::query)?;
                Ok(result.rows_affected())
            }
        }
    }

    async fn begin(&self) -> StratumResult<Tx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StratumError::Connection(format!("failed to begin transaction: {}", e)))?;

        let token = Tx::new();
        self.txs
            .lock()
            .map_err(|_| StratumError::Transaction("transaction registry poisoned".into()))?
            .insert(token.id(), Arc::new(tokio::sync::Mutex::new(tx)));

        Ok(token)
    }

    async fn commit(&self, tx: Tx) -> StratumResult<()> {
        self.take_tx(tx)?.commit().await.map_err(StratumError::query)
    }

    async fn rollback(&self, tx: Tx) -> StratumResult<()> {
        self.take_tx(tx)?
            .rollback()
            .await
            .map_err(StratumError::query)
    }

    async fn ping(&self) -> StratumResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StratumError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> StratumResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_missing_driver() {
        let config: ConnectionConfig =
            serde_json::from_value(serde_json::json!({ "connection_string": "postgres://x" }))
                .unwrap();

        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, StratumError::Config(_)));
    }
}
