//! Join strategies and their batched resolution.
//!
//! A join attaches related data onto parent rows in place. Resolution for
//! a list of parents is always batched: the distinct key set goes out as
//! one `IN`-filtered query per join, however many parents there are.

use std::collections::{HashMap, HashSet};

use async_recursion::async_recursion;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::ast::{Filter, Value, WhereOp};
use crate::error::{StratumError, StratumResult};
use crate::executor::{Row, Tx};
use crate::model::{FindOptions, Model};

/// The relationship shape a join resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// One related row (or null) per parent.
    OneToOne,
    /// A list of related rows per parent.
    OneToMany,
    /// A boolean per parent.
    Exists,
}

/// A declared join: target table plus the key pair connecting it to the
/// parent. `local_key` is a logical field on the parent; `foreign_key` is
/// the logical field on the target it is matched against.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinDef {
    pub kind: JoinKind,
    pub table: String,
    pub local_key: String,
    pub foreign_key: String,
}

impl JoinDef {
    pub fn one_to_one(
        table: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: JoinKind::OneToOne,
            table: table.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        }
    }

    pub fn one_to_many(
        table: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: JoinKind::OneToMany,
            table: table.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        }
    }

    pub fn exists(
        table: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: JoinKind::Exists,
            table: table.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

/// A join request inside a find call: the join's field name, an optional
/// column selection for the related rows, and nested sub-joins.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub name: String,
    pub select: Option<Vec<String>>,
    pub join: Vec<JoinSpec>,
}

impl JoinSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            select: None,
            join: Vec::new(),
        }
    }

    pub fn select<S: Into<String>>(mut self, cols: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(cols.into_iter().map(Into::into).collect());
        self
    }

    pub fn nest(mut self, spec: impl Into<JoinSpec>) -> Self {
        self.join.push(spec.into());
        self
    }
}

impl From<&str> for JoinSpec {
    fn from(name: &str) -> Self {
        JoinSpec::new(name)
    }
}

impl From<String> for JoinSpec {
    fn from(name: String) -> Self {
        JoinSpec::new(name)
    }
}

/// Convert a key read back from a row into a bindable value. Keys arrive
/// as JSON, so uuid keys come in as strings and must bind as uuid again.
fn key_value(v: &Json) -> Value {
    match v {
        Json::String(s) => match Uuid::parse_str(s) {
            Ok(u) => Value::Uuid(u),
            Err(_) => Value::String(s.clone()),
        },
        other => Value::from_json(other),
    }
}

/// Resolve one join spec against the parent rows, in place.
#[async_recursion]
pub(crate) async fn resolve(
    parent: &Model,
    spec: &JoinSpec,
    rows: &mut [Row],
    tx: Option<Tx>,
) -> StratumResult<()> {
    let def = parent
        .mapping()
        .join(&spec.name)
        .ok_or_else(|| StratumError::UnknownColumn(spec.name.clone()))?
        .clone();
    let foreign = parent.sibling(&def.table)?;

    // the matching key must come back with the related rows
    let select = spec.select.clone().map(|mut cols| {
        if !cols.contains(&def.foreign_key) {
            cols.push(def.foreign_key.clone());
        }
        cols
    });

    if rows.len() == 1 {
        resolve_single(&foreign, spec, &def, select, &mut rows[0], tx).await?;
    } else {
        resolve_batched(&foreign, spec, &def, select, rows, tx).await?;
    }

    // the join key was only needed transiently
    if def.local_key != parent.primary_key() {
        for row in rows.iter_mut() {
            row.remove(&def.local_key);
        }
    }

    Ok(())
}

async fn resolve_single(
    foreign: &Model,
    spec: &JoinSpec,
    def: &JoinDef,
    select: Option<Vec<String>>,
    row: &mut Row,
    tx: Option<Tx>,
) -> StratumResult<()> {
    let key = row.get(&def.local_key).cloned().unwrap_or(Json::Null);

    let attached = if key.is_null() {
        match def.kind {
            JoinKind::OneToOne => Json::Null,
            JoinKind::OneToMany => Json::Array(vec![]),
            JoinKind::Exists => Json::Bool(false),
        }
    } else {
        let filter = Filter::one(def.foreign_key.as_str(), WhereOp::Eq(key_value(&key)));

        match def.kind {
            JoinKind::OneToOne => {
                let opts = FindOptions {
                    selector: filter.into(),
                    select,
                    join: spec.join.clone(),
                    tx,
                    ..FindOptions::default()
                };
                foreign
                    .find_one(opts)
                    .await?
                    .map(Json::Object)
                    .unwrap_or(Json::Null)
            }
            JoinKind::OneToMany => {
                let opts = FindOptions {
                    selector: filter.into(),
                    select,
                    join: spec.join.clone(),
                    tx,
                    ..FindOptions::default()
                };
                Json::Array(
                    foreign
                        .find_all(opts)
                        .await?
                        .into_iter()
                        .map(Json::Object)
                        .collect(),
                )
            }
            JoinKind::Exists => Json::Bool(foreign.exists(filter, tx).await?),
        }
    };

    row.insert(spec.name.clone(), attached);
    Ok(())
}

async fn resolve_batched(
    foreign: &Model,
    spec: &JoinSpec,
    def: &JoinDef,
    select: Option<Vec<String>>,
    rows: &mut [Row],
    tx: Option<Tx>,
) -> StratumResult<()> {
    // distinct non-null key set, one secondary query regardless of row count
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for row in rows.iter() {
        if let Some(v) = row.get(&def.local_key) {
            if !v.is_null() && seen.insert(v.to_string()) {
                keys.push(key_value(v));
            }
        }
    }

    match def.kind {
        JoinKind::OneToOne => {
            let mut by_key: HashMap<String, Row> = HashMap::new();
            if !keys.is_empty() {
                let opts = FindOptions {
                    selector: Filter::one(def.foreign_key.as_str(), WhereOp::In(keys)).into(),
                    select,
                    join: spec.join.clone(),
                    tx,
                    ..FindOptions::default()
                };
                for related in foreign.find_all(opts).await? {
                    let key = related.get(&def.foreign_key).map(|k| k.to_string());
                    if let Some(key) = key {
                        by_key.insert(key, related);
                    }
                }
            }

            for row in rows.iter_mut() {
                let related = row
                    .get(&def.local_key)
                    .and_then(|k| by_key.get(&k.to_string()))
                    .cloned()
                    .map(Json::Object)
                    .unwrap_or(Json::Null);
                row.insert(spec.name.clone(), related);
            }
        }
        JoinKind::OneToMany => {
            let mut by_key: HashMap<String, Vec<Json>> = HashMap::new();
            if !keys.is_empty() {
                let opts = FindOptions {
                    selector: Filter::one(def.foreign_key.as_str(), WhereOp::In(keys)).into(),
                    select,
                    join: spec.join.clone(),
                    tx,
                    ..FindOptions::default()
                };
                for related in foreign.find_all(opts).await? {
                    let key = related.get(&def.foreign_key).map(|k| k.to_string());
                    if let Some(key) = key {
                        by_key.entry(key).or_default().push(Json::Object(related));
                    }
                }
            }

            for row in rows.iter_mut() {
                let related = row
                    .get(&def.local_key)
                    .and_then(|k| by_key.get(&k.to_string()))
                    .cloned()
                    .unwrap_or_default();
                row.insert(spec.name.clone(), Json::Array(related));
            }
        }
        JoinKind::Exists => {
            let mut found = HashSet::new();
            if !keys.is_empty() {
                let opts = FindOptions {
                    selector: Filter::one(def.foreign_key.as_str(), WhereOp::In(keys)).into(),
                    select: Some(vec![def.foreign_key.clone()]),
                    tx,
                    ..FindOptions::default()
                };
                for related in foreign.find_all(opts).await? {
                    if let Some(k) = related.get(&def.foreign_key) {
                        found.insert(k.to_string());
                    }
                }
            }

            for row in rows.iter_mut() {
                let hit = row
                    .get(&def.local_key)
                    .map(|k| found.contains(&k.to_string()))
                    .unwrap_or(false);
                row.insert(spec.name.clone(), Json::Bool(hit));
            }
        }
    }

    Ok(())
}
