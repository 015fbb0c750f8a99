//! Logical-field to physical-column mapping.
//!
//! Every model is defined by a table name, a primary key, and a list of
//! fields. A field is either a plain column (optionally hidden from the
//! default SELECT list) or a join to another model; the two are distinct
//! variants resolved once at model construction, never sniffed at call
//! time.

use crate::ast::filter::Cond;
use crate::error::{StratumError, StratumResult};
use crate::model::joins::JoinDef;
use crate::transpiler::quote_ident;

/// A plain column entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Physical column name.
    pub column: String,
    /// Hidden columns are left out of the default SELECT list but may be
    /// named explicitly in `select`.
    pub hidden: bool,
}

/// A model field: a column or a join.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDef {
    Column(ColumnSpec),
    Join(JoinDef),
}

/// A model definition, turned into a [`Mapping`] when the model is
/// registered with a database.
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub(crate) table: String,
    pub(crate) primary_key: String,
    pub(crate) fields: Vec<(String, FieldDef)>,
}

impl ModelDef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            fields: Vec::new(),
        }
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Declare a column, logical name first.
    pub fn column(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.fields.push((
            logical.into(),
            FieldDef::Column(ColumnSpec {
                column: physical.into(),
                hidden: false,
            }),
        ));
        self
    }

    /// Declare a column excluded from the default SELECT list.
    pub fn hidden_column(
        mut self,
        logical: impl Into<String>,
        physical: impl Into<String>,
    ) -> Self {
        self.fields.push((
            logical.into(),
            FieldDef::Column(ColumnSpec {
                column: physical.into(),
                hidden: true,
            }),
        ));
        self
    }

    /// Declare a join field.
    pub fn join(mut self, name: impl Into<String>, def: JoinDef) -> Self {
        self.fields.push((name.into(), FieldDef::Join(def)));
        self
    }

    /// Validate the definition and split it into its mapping. Fails fast
    /// on duplicate field names, a primary key that is not a declared
    /// column, or a join whose local key is not a declared column.
    pub(crate) fn build(self) -> StratumResult<(String, String, Mapping)> {
        let mut columns: Vec<(String, ColumnSpec)> = Vec::new();
        let mut joins: Vec<(String, JoinDef)> = Vec::new();

        for (name, field) in self.fields {
            let taken = columns.iter().any(|(n, _)| *n == name)
                || joins.iter().any(|(n, _)| *n == name);
            if taken {
                return Err(StratumError::Definition(format!(
                    "model '{}' declares field '{}' twice",
                    self.table, name
                )));
            }

            match field {
                FieldDef::Column(spec) => columns.push((name, spec)),
                FieldDef::Join(def) => joins.push((name, def)),
            }
        }

        if !columns.iter().any(|(n, _)| *n == self.primary_key) {
            return Err(StratumError::Definition(format!(
                "model '{}' primary key '{}' is not a declared column",
                self.table, self.primary_key
            )));
        }

        for (name, def) in &joins {
            if !columns.iter().any(|(n, _)| n == &def.local_key) {
                return Err(StratumError::Definition(format!(
                    "join '{}' on model '{}' uses local key '{}' which is not a declared column",
                    name, self.table, def.local_key
                )));
            }
        }

        Ok((self.table, self.primary_key, Mapping { columns, joins }))
    }
}

/// Resolved field mapping for one model. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Mapping {
    columns: Vec<(String, ColumnSpec)>,
    joins: Vec<(String, JoinDef)>,
}

impl Mapping {
    /// Resolve a logical field name to its quoted physical identifier.
    pub fn alias(&self, logical: &str) -> StratumResult<String> {
        self.columns
            .iter()
            .find(|(name, _)| name == logical)
            .map(|(_, spec)| quote_ident(&spec.column))
            .ok_or_else(|| StratumError::UnknownColumn(logical.to_string()))
    }

    pub fn join(&self, name: &str) -> Option<&JoinDef> {
        self.joins
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }

    pub fn has_column(&self, logical: &str) -> bool {
        self.columns.iter().any(|(name, _)| name == logical)
    }

    /// Render one selected column, aliasing the physical name back to the
    /// logical one when they differ.
    fn select_col(logical: &str, spec: &ColumnSpec) -> String {
        let physical = quote_ident(&spec.column);
        let label = quote_ident(logical);

        if physical == label {
            label
        } else {
            format!("{} AS {}", physical, label)
        }
    }

    /// The default SELECT list: every visible column, aliased to its
    /// logical name where needed.
    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .filter(|(_, spec)| !spec.hidden)
            .map(|(name, spec)| Self::select_col(name, spec))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// An explicit SELECT list. Hidden columns are allowed here.
    pub fn cols(&self, names: &[String]) -> StratumResult<String> {
        let rendered = names
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(n, spec)| Self::select_col(n, spec))
                    .ok_or_else(|| StratumError::UnknownColumn(name.clone()))
            })
            .collect::<StratumResult<Vec<_>>>()?;

        Ok(rendered.join(", "))
    }

    /// Apply the condition list against this mapping, yielding rendered
    /// (fragment, values) pairs in input order.
    pub(crate) fn render_conds(
        &self,
        conds: &[Cond],
    ) -> StratumResult<Vec<(String, Vec<crate::ast::Value>)>> {
        conds
            .iter()
            .map(|(field, op)| Ok(op.render(&self.alias(field)?)))
            .collect()
    }
}

/// Derive a display name for not-found faults: strip a trailing plural
/// `s` and underscores, then capitalize ("user_accounts" -> "Useraccount").
pub fn model_name(table: &str) -> String {
    let name = table.trim_end_matches('s').replace('_', "");

    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::joins::JoinDef;

    fn users() -> ModelDef {
        ModelDef::new("users")
            .column("id", "id")
            .column("name", "name")
            .column("createdAt", "created_at")
            .hidden_column("password", "password_hash")
    }

    #[test]
    fn test_alias_resolution() {
        let (_, _, mapping) = users().build().unwrap();
        assert_eq!(mapping.alias("id").unwrap(), r#""id""#);
        assert_eq!(mapping.alias("createdAt").unwrap(), r#""created_at""#);
        assert!(matches!(
            mapping.alias("nope"),
            Err(StratumError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_select_list_hides_hidden_columns() {
        let (_, _, mapping) = users().build().unwrap();
        assert_eq!(
            mapping.select_list(),
            r#""id", "name", "created_at" AS "createdAt""#
        );

        // explicit selection may still name them
        let cols = mapping
            .cols(&["password".to_string(), "id".to_string()])
            .unwrap();
        assert_eq!(cols, r#""password_hash" AS "password", "id""#);
    }

    #[test]
    fn test_duplicate_field_fails() {
        let err = ModelDef::new("users")
            .column("id", "id")
            .column("id", "id2")
            .build()
            .unwrap_err();
        assert!(matches!(err, StratumError::Definition(_)));
    }

    #[test]
    fn test_primary_key_must_be_declared() {
        let err = ModelDef::new("users")
            .column("name", "name")
            .build()
            .unwrap_err();
        assert!(matches!(err, StratumError::Definition(_)));
    }

    #[test]
    fn test_join_local_key_must_be_declared() {
        let err = ModelDef::new("users")
            .column("id", "id")
            .join("country", JoinDef::one_to_one("countries", "country_id", "id"))
            .build()
            .unwrap_err();
        assert!(matches!(err, StratumError::Definition(_)));
    }

    #[test]
    fn test_model_name() {
        assert_eq!(model_name("users"), "User");
        assert_eq!(model_name("user_accounts"), "Useraccount");
    }
}
