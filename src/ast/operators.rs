use serde::{Deserialize, Serialize};

use crate::ast::Value;

/// WHERE operators.
///
/// Each operator renders to a SQL fragment referencing the resolved column
/// identifier plus the positional values the fragment consumes, in order.
/// Rendering is pure: no operator touches state outside its return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WhereOp {
    /// Equality (=), the implicit operator for bare scalars
    Eq(Value),
    /// Greater than (>)
    MoreThan(Value),
    /// Less than (<)
    LessThan(Value),
    /// BETWEEN low AND high
    Between(Value, Value),
    /// Membership: column = ANY(array)
    In(Vec<Value>),
    /// Negated membership: NOT (column = ANY(array))
    NotIn(Vec<Value>),
    /// Array column contains the value: value = ANY(column)
    Includes(Value),
    /// Case-insensitive substring match; the pattern is wrapped in `%...%`
    ILike(String),
    /// Case-insensitive prefix match; the pattern gets a trailing `%`
    ILikeStart(String),
    /// Inequality (!=)
    NotEqual(Value),
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    NotNull,
}

impl WhereOp {
    /// Render the operator against a resolved column identifier.
    ///
    /// Returns the SQL fragment and the values it consumes; every `?` in
    /// the fragment corresponds to exactly one returned value, in order.
    pub fn render(&self, alias: &str) -> (String, Vec<Value>) {
        match self {
            WhereOp::Eq(v) => (format!("{} = ?", alias), vec![v.clone()]),
            WhereOp::MoreThan(v) => (format!("{} > ?", alias), vec![v.clone()]),
            WhereOp::LessThan(v) => (format!("{} < ?", alias), vec![v.clone()]),
            WhereOp::Between(low, high) => (
                format!("{} BETWEEN ? AND ?", alias),
                vec![low.clone(), high.clone()],
            ),
            WhereOp::In(list) => (
                format!("{} = ANY(?)", alias),
                vec![Value::Array(list.clone())],
            ),
            WhereOp::NotIn(list) => (
                format!("NOT ({} = ANY(?))", alias),
                vec![Value::Array(list.clone())],
            ),
            WhereOp::Includes(v) => (format!("? = ANY({})", alias), vec![v.clone()]),
            WhereOp::ILike(s) => (
                format!("{} ILIKE ?", alias),
                vec![Value::String(format!("%{}%", s))],
            ),
            WhereOp::ILikeStart(s) => (
                format!("LOWER({}) ILIKE ?", alias),
                vec![Value::String(format!("{}%", s))],
            ),
            WhereOp::NotEqual(v) => (format!("{} != ?", alias), vec![v.clone()]),
            WhereOp::IsNull => (format!("{} IS NULL", alias), vec![]),
            WhereOp::NotNull => (format!("{} IS NOT NULL", alias), vec![]),
        }
    }

    pub fn eq(v: impl Into<Value>) -> Self {
        WhereOp::Eq(v.into())
    }

    pub fn more_than(v: impl Into<Value>) -> Self {
        WhereOp::MoreThan(v.into())
    }

    pub fn less_than(v: impl Into<Value>) -> Self {
        WhereOp::LessThan(v.into())
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        WhereOp::Between(low.into(), high.into())
    }

    pub fn in_list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        WhereOp::In(items.into_iter().map(Into::into).collect())
    }

    pub fn not_in<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        WhereOp::NotIn(items.into_iter().map(Into::into).collect())
    }

    pub fn includes(v: impl Into<Value>) -> Self {
        WhereOp::Includes(v.into())
    }

    pub fn ilike(s: impl Into<String>) -> Self {
        WhereOp::ILike(s.into())
    }

    pub fn ilike_start(s: impl Into<String>) -> Self {
        WhereOp::ILikeStart(s.into())
    }

    pub fn not_equal(v: impl Into<Value>) -> Self {
        WhereOp::NotEqual(v.into())
    }
}

impl From<Value> for WhereOp {
    fn from(v: Value) -> Self {
        WhereOp::Eq(v)
    }
}

impl From<bool> for WhereOp {
    fn from(v: bool) -> Self {
        WhereOp::Eq(v.into())
    }
}

impl From<i32> for WhereOp {
    fn from(v: i32) -> Self {
        WhereOp::Eq(v.into())
    }
}

impl From<i64> for WhereOp {
    fn from(v: i64) -> Self {
        WhereOp::Eq(v.into())
    }
}

impl From<f64> for WhereOp {
    fn from(v: f64) -> Self {
        WhereOp::Eq(v.into())
    }
}

impl From<&str> for WhereOp {
    fn from(v: &str) -> Self {
        WhereOp::Eq(v.into())
    }
}

impl From<String> for WhereOp {
    fn from(v: String) -> Self {
        WhereOp::Eq(v.into())
    }
}

impl From<uuid::Uuid> for WhereOp {
    fn from(v: uuid::Uuid) -> Self {
        WhereOp::Eq(v.into())
    }
}

/// SET operators for UPDATE assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetOp {
    /// Plain assignment, the implicit operator for bare scalars
    Assign(Value),
    /// column = column + value
    Increment(Value),
    /// column = column - value
    Decrement(Value),
}

impl SetOp {
    pub fn render(&self, alias: &str) -> (String, Vec<Value>) {
        match self {
            SetOp::Assign(v) => (format!("{} = ?", alias), vec![v.clone()]),
            SetOp::Increment(v) => (format!("{} = {} + ?", alias, alias), vec![v.clone()]),
            SetOp::Decrement(v) => (format!("{} = {} - ?", alias, alias), vec![v.clone()]),
        }
    }

    pub fn assign(v: impl Into<Value>) -> Self {
        SetOp::Assign(v.into())
    }

    pub fn increment(v: impl Into<Value>) -> Self {
        SetOp::Increment(v.into())
    }

    pub fn decrement(v: impl Into<Value>) -> Self {
        SetOp::Decrement(v.into())
    }
}

impl From<Value> for SetOp {
    fn from(v: Value) -> Self {
        SetOp::Assign(v)
    }
}

impl From<bool> for SetOp {
    fn from(v: bool) -> Self {
        SetOp::Assign(v.into())
    }
}

impl From<i32> for SetOp {
    fn from(v: i32) -> Self {
        SetOp::Assign(v.into())
    }
}

impl From<i64> for SetOp {
    fn from(v: i64) -> Self {
        SetOp::Assign(v.into())
    }
}

impl From<f64> for SetOp {
    fn from(v: f64) -> Self {
        SetOp::Assign(v.into())
    }
}

impl From<&str> for SetOp {
    fn from(v: &str) -> Self {
        SetOp::Assign(v.into())
    }
}

impl From<String> for SetOp {
    fn from(v: String) -> Self {
        SetOp::Assign(v.into())
    }
}

impl From<uuid::Uuid> for SetOp {
    fn from(v: uuid::Uuid) -> Self {
        SetOp::Assign(v.into())
    }
}

/// Sort order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_fragments() {
        let cases: Vec<(WhereOp, &str, usize)> = vec![
            (WhereOp::more_than(3), r#""c" > ?"#, 1),
            (WhereOp::less_than(3), r#""c" < ?"#, 1),
            (WhereOp::between(1, 9), r#""c" BETWEEN ? AND ?"#, 2),
            (WhereOp::in_list([1, 2]), r#""c" = ANY(?)"#, 1),
            (WhereOp::not_in([1, 2]), r#"NOT ("c" = ANY(?))"#, 1),
            (WhereOp::includes(7), r#"? = ANY("c")"#, 1),
            (WhereOp::ilike("bob"), r#""c" ILIKE ?"#, 1),
            (WhereOp::ilike_start("bob"), r#"LOWER("c") ILIKE ?"#, 1),
            (WhereOp::not_equal(0), r#""c" != ?"#, 1),
            (WhereOp::IsNull, r#""c" IS NULL"#, 0),
            (WhereOp::NotNull, r#""c" IS NOT NULL"#, 0),
        ];

        for (op, fragment, arity) in cases {
            let (sql, values) = op.render("\"c\"");
            assert_eq!(sql, fragment);
            assert_eq!(values.len(), arity);
            assert_eq!(sql.matches('?').count(), arity);
        }
    }

    #[test]
    fn test_in_pushes_one_array_value() {
        let (_, values) = WhereOp::in_list([1, 2, 3]).render("\"id\"");
        assert_eq!(
            values,
            vec![Value::Array(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3)
            ])]
        );
    }

    #[test]
    fn test_pattern_operators_wrap_the_value() {
        let (_, values) = WhereOp::ilike("ann").render("\"name\"");
        assert_eq!(values, vec![Value::String("%ann%".into())]);

        let (_, values) = WhereOp::ilike_start("ann").render("\"name\"");
        assert_eq!(values, vec![Value::String("ann%".into())]);
    }

    #[test]
    fn test_set_fragments() {
        let (sql, values) = SetOp::increment(2).render("\"age\"");
        assert_eq!(sql, r#""age" = "age" + ?"#);
        assert_eq!(values, vec![Value::Int(2)]);

        let (sql, _) = SetOp::decrement(2).render("\"age\"");
        assert_eq!(sql, r#""age" = "age" - ?"#);

        let (sql, values) = SetOp::assign("x").render("\"name\"");
        assert_eq!(sql, r#""name" = ?"#);
        assert_eq!(values, vec![Value::String("x".into())]);
    }
}
