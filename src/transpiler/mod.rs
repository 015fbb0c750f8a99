//! SQL rendering for filter, assignment and schema descriptors.
//!
//! Fragments are emitted with `?` placeholders; each `?` consumes exactly
//! one value from the clause's value list, in order. Drivers rewrite `?`
//! into their native placeholder syntax (`$1`, `$2`, ...) right before
//! execution via [`format_params`].

pub mod ddl;

use crate::ast::{Filter, SetOp, SortOrder};
use crate::ast::filter::Cond;
use crate::error::{StratumError, StratumResult};
use crate::model::mapping::Mapping;

/// A compiled SQL fragment plus the positional values it consumes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clause {
    pub sql: String,
    pub values: Vec<crate::ast::Value>,
}

/// Quote an identifier for Postgres, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Rewrite `?` placeholders into numbered `$n` placeholders, left to
/// right. The compiler never embeds user text into fragments, so a `?`
/// always is a placeholder.
pub fn format_params(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = 0usize;

    for ch in sql.chars() {
        if ch == '?' {
            next += 1;
            out.push('$');
            out.push_str(&next.to_string());
        } else {
            out.push(ch);
        }
    }

    out
}

fn compile_group(mapping: &Mapping, conds: &[Cond], clause: &mut Clause) -> StratumResult<()> {
    if conds.is_empty() {
        return Err(StratumError::EmptyFilter);
    }

    for (i, (fragment, values)) in mapping.render_conds(conds)?.into_iter().enumerate() {
        if i > 0 {
            clause.sql.push_str(" AND ");
        }
        clause.sql.push_str(&fragment);
        clause.values.extend(values);
    }

    Ok(())
}

/// Compile a WHERE descriptor.
///
/// `Filter::All` compiles to an empty fragment (no WHERE keyword); any
/// other filter yields `WHERE ...`. Empty groups are rejected rather than
/// silently matching every row.
pub fn compile_where(mapping: &Mapping, filter: &Filter) -> StratumResult<Clause> {
    let mut clause = Clause::default();

    match filter {
        Filter::All => return Ok(clause),
        Filter::And(conds) => {
            clause.sql.push_str("WHERE ");
            compile_group(mapping, conds, &mut clause)?;
        }
        Filter::Or(groups) => {
            if groups.is_empty() {
                return Err(StratumError::EmptyFilter);
            }

            clause.sql.push_str("WHERE ");
            for (i, group) in groups.iter().enumerate() {
                if i > 0 {
                    clause.sql.push_str(" OR ");
                }
                compile_group(mapping, group, &mut clause)?;
            }
        }
    }

    Ok(clause)
}

/// Compile an UPDATE assignment list into `SET a = ?, b = ?, ...`.
///
/// Callers short-circuit empty assignment lists before compiling; an
/// empty list here is rejected for the same reason as an empty filter.
pub fn compile_set(mapping: &Mapping, assignments: &[(String, SetOp)]) -> StratumResult<Clause> {
    if assignments.is_empty() {
        return Err(StratumError::EmptyFilter);
    }

    let mut clause = Clause {
        sql: "SET ".to_string(),
        values: Vec::new(),
    };

    for (i, (field, op)) in assignments.iter().enumerate() {
        if i > 0 {
            clause.sql.push_str(", ");
        }

        let (fragment, values) = op.render(&mapping.alias(field)?);
        clause.sql.push_str(&fragment);
        clause.values.extend(values);
    }

    Ok(clause)
}

/// Compile an ORDER BY column list.
pub fn compile_order_by(
    mapping: &Mapping,
    order: &[(String, SortOrder)],
) -> StratumResult<String> {
    let rendered = order
        .iter()
        .map(|(field, dir)| Ok(format!("{} {}", mapping.alias(field)?, dir.as_sql())))
        .collect::<StratumResult<Vec<_>>>()?;

    Ok(rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::{Value, WhereOp};
    use crate::model::mapping::ModelDef;

    fn mapping() -> Mapping {
        let (_, _, mapping) = ModelDef::new("users")
            .column("id", "id")
            .column("name", "name")
            .column("age", "age")
            .column("createdAt", "created_at")
            .build()
            .unwrap();
        mapping
    }

    #[test]
    fn test_placeholders_match_values() {
        let filters = vec![
            Filter::one("id", 1),
            Filter::and([("id", WhereOp::eq(1)), ("age", WhereOp::between(2, 9))]),
            Filter::and([("name", WhereOp::ilike("bo")), ("age", WhereOp::NotNull)]),
            Filter::or([
                vec![("id", WhereOp::in_list([1, 2]))],
                vec![("age", WhereOp::IsNull), ("name", WhereOp::eq("x"))],
            ]),
        ];

        for filter in filters {
            let clause = compile_where(&mapping(), &filter).unwrap();
            assert_eq!(clause.sql.matches('?').count(), clause.values.len());
        }
    }

    #[test]
    fn test_in_filter_compiles_to_any() {
        let clause =
            compile_where(&mapping(), &Filter::one("id", WhereOp::in_list([1, 2, 3]))).unwrap();

        assert_eq!(clause.sql, r#"WHERE "id" = ANY(?)"#);
        assert_eq!(
            clause.values,
            vec![Value::Array(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3)
            ])]
        );
    }

    #[test]
    fn test_and_or_composition() {
        let clause = compile_where(
            &mapping(),
            &Filter::or([
                vec![("id", WhereOp::eq(1)), ("age", WhereOp::more_than(18))],
                vec![("name", WhereOp::eq("root"))],
            ]),
        )
        .unwrap();

        assert_eq!(
            clause.sql,
            r#"WHERE "id" = ? AND "age" > ? OR "name" = ?"#
        );
        assert_eq!(
            clause.values,
            vec![Value::Int(1), Value::Int(18), Value::String("root".into())]
        );
    }

    #[test]
    fn test_match_all_is_explicit() {
        let clause = compile_where(&mapping(), &Filter::All).unwrap();
        assert_eq!(clause.sql, "");
        assert!(clause.values.is_empty());

        assert!(matches!(
            compile_where(&mapping(), &Filter::And(vec![])),
            Err(StratumError::EmptyFilter)
        ));
        assert!(matches!(
            compile_where(&mapping(), &Filter::Or(vec![])),
            Err(StratumError::EmptyFilter)
        ));
        assert!(matches!(
            compile_where(&mapping(), &Filter::Or(vec![vec![]])),
            Err(StratumError::EmptyFilter)
        ));
    }

    #[test]
    fn test_compile_set() {
        let clause = compile_set(
            &mapping(),
            &[
                ("name".to_string(), SetOp::assign("ann")),
                ("age".to_string(), SetOp::increment(1)),
            ],
        )
        .unwrap();

        assert_eq!(clause.sql, r#"SET "name" = ?, "age" = "age" + ?"#);
        assert_eq!(
            clause.values,
            vec![Value::String("ann".into()), Value::Int(1)]
        );
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        assert!(matches!(
            compile_where(&mapping(), &Filter::one("nope", 1)),
            Err(StratumError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_format_params_numbers_left_to_right() {
        assert_eq!(
            format_params(r#"UPDATE "t" SET "a" = ? WHERE "id" = ?"#),
            r#"UPDATE "t" SET "a" = $1 WHERE "id" = $2"#
        );
        assert_eq!(format_params("no placeholders"), "no placeholders");
    }

    #[test]
    fn test_order_by() {
        let sql = compile_order_by(
            &mapping(),
            &[
                ("createdAt".to_string(), SortOrder::Desc),
                ("id".to_string(), SortOrder::Asc),
            ],
        )
        .unwrap();
        assert_eq!(sql, r#""created_at" DESC, "id" ASC"#);
    }
}
