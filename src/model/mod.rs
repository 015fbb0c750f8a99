//! Model runtime.
//!
//! Models are defined against an explicit [`Database`] instance that owns
//! the executor: construct the database first, then register each model
//! definition with [`Database::define`]. Nothing is global; join targets
//! are looked up through the database the model was registered with.
//!
//! Every operation is stateless given the model's mapping: it compiles a
//! statement, hands it to the executor, and shapes the rows that come
//! back. Rows are JSON maps keyed by logical field names.

pub mod joins;
pub mod mapping;

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use crate::ast::{Filter, Selector, SetOp, SortOrder, Value, WhereOp};
use crate::error::{StratumError, StratumResult};
use crate::executor::{Executor, Row, Tx};
use crate::transpiler::{compile_order_by, compile_set, compile_where, quote_ident};

pub use self::joins::{JoinDef, JoinKind, JoinSpec};
pub use self::mapping::{ColumnSpec, FieldDef, Mapping, ModelDef, model_name};

/// Which columns a mutating statement should return.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Returning {
    /// No RETURNING clause.
    #[default]
    None,
    /// All visible columns.
    All,
    /// An exact aliased column list.
    Columns(Vec<String>),
}

/// Options for `find_all` / `find_one`.
#[derive(Debug, Clone)]
pub struct FindOptions {
    pub selector: Selector,
    /// Columns to select; defaults to every visible column.
    pub select: Option<Vec<String>>,
    pub join: Vec<JoinSpec>,
    pub order_by: Vec<(String, SortOrder)>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub tx: Option<Tx>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            selector: Selector::Where(Filter::All),
            select: None,
            join: Vec::new(),
            order_by: Vec::new(),
            skip: None,
            limit: None,
            tx: None,
        }
    }
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.selector = Selector::Where(filter);
        self
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.selector = Selector::Key(key.into());
        self
    }

    pub fn select<S: Into<String>>(mut self, cols: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(cols.into_iter().map(Into::into).collect());
        self
    }

    pub fn join(mut self, spec: impl Into<JoinSpec>) -> Self {
        self.join.push(spec.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    pub fn skip(mut self, n: i64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn tx(mut self, tx: Tx) -> Self {
        self.tx = Some(tx);
        self
    }
}

impl From<Filter> for FindOptions {
    fn from(filter: Filter) -> Self {
        FindOptions::new().filter(filter)
    }
}

impl From<Selector> for FindOptions {
    fn from(selector: Selector) -> Self {
        FindOptions {
            selector,
            ..FindOptions::default()
        }
    }
}

/// Options for `update`.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub selector: Selector,
    pub set: Vec<(String, SetOp)>,
    pub returning: Returning,
    pub tx: Option<Tx>,
}

impl UpdateOptions {
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            set: Vec::new(),
            returning: Returning::None,
            tx: None,
        }
    }

    pub fn set(mut self, field: impl Into<String>, op: impl Into<SetOp>) -> Self {
        self.set.push((field.into(), op.into()));
        self
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }

    pub fn tx(mut self, tx: Tx) -> Self {
        self.tx = Some(tx);
        self
    }
}

type Registry = RwLock<HashMap<String, Arc<Model>>>;

/// The model registry bound to one executor.
pub struct Database {
    executor: Arc<dyn Executor>,
    models: Arc<Registry>,
}

impl Database {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validate a model definition and register the resulting model.
    pub fn define(&self, def: ModelDef) -> StratumResult<Arc<Model>> {
        let (table, primary_key, mapping) = def.build()?;

        let mut models = self
            .models
            .write()
            .map_err(|_| StratumError::Definition("model registry poisoned".into()))?;
        if models.contains_key(&table) {
            return Err(StratumError::Definition(format!(
                "model for table '{}' is already defined",
                table
            )));
        }

        let model = Arc::new(Model {
            quoted_table: quote_ident(&table),
            select_list: mapping.select_list(),
            table: table.clone(),
            primary_key,
            mapping,
            executor: self.executor.clone(),
            registry: Arc::downgrade(&self.models),
        });

        models.insert(table, model.clone());
        Ok(model)
    }

    pub fn model(&self, table: &str) -> Option<Arc<Model>> {
        self.models.read().ok()?.get(table).cloned()
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        self.executor.clone()
    }
}

/// One table's operations.
pub struct Model {
    table: String,
    quoted_table: String,
    primary_key: String,
    mapping: Mapping,
    select_list: String,
    executor: Arc<dyn Executor>,
    registry: Weak<Registry>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.table)
            .field("quoted_table", &self.quoted_table)
            .field("primary_key", &self.primary_key)
            .field("mapping", &self.mapping)
            .field("select_list", &self.select_list)
            .finish_non_exhaustive()
    }
}

impl Model {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub(crate) fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub(crate) fn sibling(&self, table: &str) -> StratumResult<Arc<Model>> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| StratumError::Definition("model outlived its database".into()))?;

        let found = registry.read().ok().and_then(|m| m.get(table).cloned());
        found.ok_or_else(|| {
            StratumError::Definition(format!("join target '{}' is not defined", table))
        })
    }

    /// Resolve a selector into a filter; bare keys filter on the primary
    /// key.
    fn selector_filter(&self, selector: Selector) -> Filter {
        match selector {
            Selector::Key(v) => Filter::And(vec![(self.primary_key.clone(), WhereOp::Eq(v))]),
            Selector::Where(f) => f,
        }
    }

    /// The SELECT list for a find call. An explicit selection is extended
    /// with each requested join's local key, which batching needs.
    fn selection(&self, opts: &FindOptions) -> StratumResult<String> {
        match &opts.select {
            None => Ok(self.select_list.clone()),
            Some(cols) => {
                let mut cols = cols.clone();
                for spec in &opts.join {
                    let def = self
                        .mapping
                        .join(&spec.name)
                        .ok_or_else(|| StratumError::UnknownColumn(spec.name.clone()))?;
                    if !cols.contains(&def.local_key) {
                        cols.push(def.local_key.clone());
                    }
                }
                self.mapping.cols(&cols)
            }
        }
    }

    async fn run_joins(
        &self,
        rows: &mut [Row],
        specs: &[JoinSpec],
        tx: Option<Tx>,
    ) -> StratumResult<()> {
        for spec in specs {
            joins::resolve(self, spec, rows, tx).await?;
        }
        Ok(())
    }

    /// Insert one row and return it.
    pub async fn create<S, V>(
        &self,
        values: impl IntoIterator<Item = (S, V)>,
        tx: Option<Tx>,
    ) -> StratumResult<Row>
    where
        S: Into<String>,
        V: Into<Value>,
    {
        let mut cols = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        for (field, value) in values {
            cols.push(self.mapping.alias(&field.into())?);
            params.push(value.into());
        }

        let placeholders = vec!["?"; params.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            self.quoted_table,
            cols.join(", "),
            placeholders,
            self.select_list
        );

        let rows = self.executor.query(&sql, &params, tx).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StratumError::query("insert returned no row"))
    }

    /// Insert many rows with a single statement and return them.
    ///
    /// The column set comes from the first row; fields missing from later
    /// rows bind NULL. An empty input returns empty without querying.
    pub async fn create_many<S, V, I>(
        &self,
        rows: impl IntoIterator<Item = I>,
        tx: Option<Tx>,
    ) -> StratumResult<Vec<Row>>
    where
        S: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
    {
        let rows: Vec<Vec<(String, Value)>> = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(field, value)| (field.into(), value.into()))
                    .collect()
            })
            .collect();

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let columns: Vec<String> = rows[0].iter().map(|(field, _)| field.clone()).collect();
        let aliased = columns
            .iter()
            .map(|field| self.mapping.alias(field))
            .collect::<StratumResult<Vec<_>>>()?;

        let mut params = Vec::with_capacity(rows.len() * columns.len());
        for row in &rows {
            for column in &columns {
                let value = row
                    .iter()
                    .find(|(field, _)| field == column)
                    .map(|(_, value)| value.clone())
                    .unwrap_or(Value::Null);
                params.push(value);
            }
        }

        let group = format!("({})", vec!["?"; columns.len()].join(", "));
        let groups = vec![group; rows.len()].join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {} RETURNING {}",
            self.quoted_table,
            aliased.join(", "),
            groups,
            self.select_list
        );

        self.executor.query(&sql, &params, tx).await
    }

    /// Update rows matched by the selector.
    ///
    /// An empty assignment list behaves as `find_one` with the same
    /// selector: a documented no-op that issues no mutating statement.
    /// SET values come first, WHERE values after them.
    pub async fn update(&self, opts: UpdateOptions) -> StratumResult<Option<Row>> {
        if opts.set.is_empty() {
            let find = FindOptions {
                selector: opts.selector,
                tx: opts.tx,
                ..FindOptions::default()
            };
            return self.find_one(find).await;
        }

        let filter = self.selector_filter(opts.selector);
        let set = compile_set(&self.mapping, &opts.set)?;
        let clause = compile_where(&self.mapping, &filter)?;

        let mut sql = format!("UPDATE {} {}", self.quoted_table, set.sql);
        if !clause.sql.is_empty() {
            sql.push(' ');
            sql.push_str(&clause.sql);
        }

        let mut values = set.values;
        values.extend(clause.values);

        let returning = match &opts.returning {
            Returning::None => None,
            Returning::All => Some(self.select_list.clone()),
            Returning::Columns(cols) => Some(self.mapping.cols(cols)?),
        };

        match returning {
            Some(cols) => {
                sql.push_str(" RETURNING ");
                sql.push_str(&cols);
                let rows = self.executor.query(&sql, &values, opts.tx).await?;
                Ok(rows.into_iter().next())
            }
            None => {
                self.executor.execute(&sql, &values, opts.tx).await?;
                Ok(None)
            }
        }
    }

    /// Delete rows matched by the selector; true if any row was affected.
    pub async fn delete(
        &self,
        selector: impl Into<Selector>,
        tx: Option<Tx>,
    ) -> StratumResult<bool> {
        let filter = self.selector_filter(selector.into());
        let clause = compile_where(&self.mapping, &filter)?;

        let mut sql = format!("DELETE FROM {}", self.quoted_table);
        if !clause.sql.is_empty() {
            sql.push(' ');
            sql.push_str(&clause.sql);
        }

        let affected = self.executor.execute(&sql, &clause.values, tx).await?;
        Ok(affected > 0)
    }

    /// Fetch every matching row.
    pub async fn find_all(&self, opts: impl Into<FindOptions>) -> StratumResult<Vec<Row>> {
        let opts = opts.into();

        let cols = self.selection(&opts)?;
        let filter = self.selector_filter(opts.selector.clone());
        let clause = compile_where(&self.mapping, &filter)?;

        let mut sql = format!("SELECT {} FROM {}", cols, self.quoted_table);
        if !clause.sql.is_empty() {
            sql.push(' ');
            sql.push_str(&clause.sql);
        }

        let mut values = clause.values;
        if !opts.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&compile_order_by(&self.mapping, &opts.order_by)?);
        }
        if let Some(skip) = opts.skip {
            sql.push_str(" OFFSET ?");
            values.push(skip.into());
        }
        if let Some(limit) = opts.limit {
            sql.push_str(" LIMIT ?");
            values.push(limit.into());
        }

        let mut rows = self.executor.query(&sql, &values, opts.tx).await?;
        if rows.is_empty() || opts.join.is_empty() {
            return Ok(rows);
        }

        self.run_joins(&mut rows, &opts.join, opts.tx).await?;
        Ok(rows)
    }

    /// Fetch the first matching row, if any. "No match" is `None`, not an
    /// error.
    pub async fn find_one(&self, opts: impl Into<FindOptions>) -> StratumResult<Option<Row>> {
        let opts = opts.into();

        let cols = self.selection(&opts)?;
        let filter = self.selector_filter(opts.selector.clone());
        let clause = compile_where(&self.mapping, &filter)?;

        let mut sql = format!("SELECT {} FROM {}", cols, self.quoted_table);
        if !clause.sql.is_empty() {
            sql.push(' ');
            sql.push_str(&clause.sql);
        }
        if !opts.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&compile_order_by(&self.mapping, &opts.order_by)?);
        }

        let rows = self.executor.query(&sql, &clause.values, opts.tx).await?;
        let Some(mut row) = rows.into_iter().next() else {
            return Ok(None);
        };

        if !opts.join.is_empty() {
            self.run_joins(std::slice::from_mut(&mut row), &opts.join, opts.tx)
                .await?;
        }

        Ok(Some(row))
    }

    /// Like `find_one`, but a missing row is a typed fault.
    pub async fn find_one_or_fail(&self, opts: impl Into<FindOptions>) -> StratumResult<Row> {
        self.find_one(opts)
            .await?
            .ok_or_else(|| StratumError::not_found(model_name(&self.table)))
    }

    /// Count matching rows.
    pub async fn count(
        &self,
        selector: impl Into<Selector>,
        tx: Option<Tx>,
    ) -> StratumResult<i64> {
        let filter = self.selector_filter(selector.into());
        let clause = compile_where(&self.mapping, &filter)?;

        let mut sql = format!(
            "SELECT COUNT(*)::integer AS count FROM {}",
            self.quoted_table
        );
        if !clause.sql.is_empty() {
            sql.push(' ');
            sql.push_str(&clause.sql);
        }

        let rows = self.executor.query(&sql, &clause.values, tx).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|count| count.as_i64())
            .unwrap_or(0))
    }

    /// True iff at least one row matches.
    pub async fn exists(
        &self,
        selector: impl Into<Selector>,
        tx: Option<Tx>,
    ) -> StratumResult<bool> {
        Ok(self.count(selector, tx).await? > 0)
    }

    /// Like `exists`, but "no match" is a typed fault.
    pub async fn exists_or_fail(
        &self,
        selector: impl Into<Selector>,
        tx: Option<Tx>,
    ) -> StratumResult<bool> {
        if self.exists(selector, tx).await? {
            Ok(true)
        } else {
            Err(StratumError::not_found(model_name(&self.table)))
        }
    }
}
