use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ast::{Value, WhereOp};

/// A single condition: logical field name plus the operator applied to it.
pub type Cond = (String, WhereOp);

/// A WHERE descriptor tree.
///
/// Conditions inside a group are AND-combined; groups inside `Or` are
/// OR-combined. There is no implicit match-everything: an empty group is
/// rejected at compile time, and `Filter::All` is the explicit opt-in for
/// statements that should touch every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Filter {
    /// Matches every row. Renders no WHERE clause.
    #[default]
    All,
    /// AND-combined conditions.
    And(Vec<Cond>),
    /// OR across groups, AND within each group.
    Or(Vec<Vec<Cond>>),
}

impl Filter {
    /// Single-condition filter.
    pub fn one(field: impl Into<String>, op: impl Into<WhereOp>) -> Self {
        Filter::And(vec![(field.into(), op.into())])
    }

    /// AND-combined group of conditions.
    pub fn and<F, O>(conds: impl IntoIterator<Item = (F, O)>) -> Self
    where
        F: Into<String>,
        O: Into<WhereOp>,
    {
        Filter::And(
            conds
                .into_iter()
                .map(|(f, o)| (f.into(), o.into()))
                .collect(),
        )
    }

    /// OR-combined list of AND groups.
    pub fn or<F, O, G>(groups: impl IntoIterator<Item = G>) -> Self
    where
        F: Into<String>,
        O: Into<WhereOp>,
        G: IntoIterator<Item = (F, O)>,
    {
        Filter::Or(
            groups
                .into_iter()
                .map(|g| g.into_iter().map(|(f, o)| (f.into(), o.into())).collect())
                .collect(),
        )
    }
}

/// A row selector: either a bare primary-key value or a filter.
///
/// The two cases are distinct constructors, so a filter can never be
/// mistaken for a key (or the other way around) no matter what fields a
/// model declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selector {
    /// Match by primary key.
    Key(Value),
    /// Match by filter.
    Where(Filter),
}

impl From<Filter> for Selector {
    fn from(f: Filter) -> Self {
        Selector::Where(f)
    }
}

impl From<Value> for Selector {
    fn from(v: Value) -> Self {
        Selector::Key(v)
    }
}

impl From<i32> for Selector {
    fn from(v: i32) -> Self {
        Selector::Key(v.into())
    }
}

impl From<i64> for Selector {
    fn from(v: i64) -> Self {
        Selector::Key(v.into())
    }
}

impl From<&str> for Selector {
    fn from(v: &str) -> Self {
        Selector::Key(v.into())
    }
}

impl From<String> for Selector {
    fn from(v: String) -> Self {
        Selector::Key(v.into())
    }
}

impl From<Uuid> for Selector {
    fn from(v: Uuid) -> Self {
        Selector::Key(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let f = Filter::one("id", 1);
        assert_eq!(f, Filter::And(vec![("id".into(), WhereOp::eq(1))]));

        let f = Filter::or([vec![("a", WhereOp::eq(1))], vec![("b", WhereOp::eq(2))]]);
        match f {
            Filter::Or(groups) => assert_eq!(groups.len(), 2),
            _ => panic!("expected Or"),
        }
    }

    #[test]
    fn test_selector_from() {
        assert_eq!(Selector::from(5), Selector::Key(Value::Int(5)));
        assert!(matches!(
            Selector::from(Filter::All),
            Selector::Where(Filter::All)
        ));
    }
}
