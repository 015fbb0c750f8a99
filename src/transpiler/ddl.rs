//! Rendering of schema-change ASTs to Postgres SQL text.
//!
//! Identifiers and raw default fragments are interpolated, not
//! parameterized; the ASTs must come from trusted callers only.

use crate::ast::{
    AlterColumn, AlterTable, ColumnDef, CreateTable, DefaultValue, DropConstraint, DropTable,
    ForeignKey, Insert,
};
use crate::transpiler::quote_ident;

fn render_default(def: &DefaultValue) -> String {
    match def {
        DefaultValue::Int(n) => format!(" DEFAULT {}", n),
        DefaultValue::Float(n) => format!(" DEFAULT {}", n),
        DefaultValue::Str(s) => format!(" DEFAULT '{}'", s.replace('\'', "''")),
        DefaultValue::Raw(sql) => format!(" DEFAULT {}", sql),
    }
}

fn render_column(name: &str, def: &ColumnDef) -> String {
    let mut column = format!("{} {}", quote_ident(name), def.data_type.as_pg());

    if def.primary_key {
        column.push_str(" PRIMARY KEY");
    }
    if def.unique {
        column.push_str(" UNIQUE");
    }
    if def.not_null {
        column.push_str(" NOT NULL");
    }
    if let Some(default) = &def.default {
        column.push_str(&render_default(default));
    }

    column
}

/// Generate CREATE TABLE SQL.
pub fn build_create_table(ast: &CreateTable) -> String {
    let mut sql = String::from("CREATE TABLE ");
    if ast.if_not_exists {
        sql.push_str("IF NOT EXISTS ");
    }
    sql.push_str(&quote_ident(&ast.table));
    sql.push_str(" (");

    let defs = ast
        .columns
        .iter()
        .map(|(name, def)| render_column(name, def))
        .collect::<Vec<_>>()
        .join(", ");

    sql.push_str(&defs);
    sql.push(')');
    sql
}

/// Generate DROP TABLE SQL.
pub fn build_drop_table(ast: &DropTable) -> String {
    format!("DROP TABLE {}", quote_ident(&ast.table))
}

/// Generate ALTER TABLE SQL covering every per-column operation in one
/// statement.
pub fn build_alter_table(ast: &AlterTable) -> String {
    let mut sql = format!("ALTER TABLE {}", quote_ident(&ast.table));

    let ops = ast
        .columns
        .iter()
        .map(|(name, op)| match op {
            AlterColumn::AddColumn(def) => format!(" ADD COLUMN {}", render_column(name, def)),
            AlterColumn::DropColumn => format!(" DROP COLUMN {}", quote_ident(name)),
            AlterColumn::SetDefault(value) => format!(
                " ALTER COLUMN {} SET{}",
                quote_ident(name),
                render_default(value)
            ),
            AlterColumn::SetType(data_type) => format!(
                " ALTER COLUMN {} TYPE {}",
                quote_ident(name),
                data_type.as_pg()
            ),
        })
        .collect::<Vec<_>>()
        .join(",");

    sql.push_str(&ops);
    sql
}

/// Generate ALTER TABLE ... ADD FOREIGN KEY SQL.
pub fn build_foreign_key(ast: &ForeignKey) -> String {
    format!(
        "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
        quote_ident(&ast.foreign.table),
        quote_ident(&ast.foreign.column),
        quote_ident(&ast.reference.table),
        quote_ident(&ast.reference.column),
    )
}

/// Generate ALTER TABLE ... DROP CONSTRAINT SQL for the conventional
/// `<table>_<column>_fkey` constraint name.
pub fn build_drop_constraint(ast: &DropConstraint) -> String {
    format!(
        "ALTER TABLE {} DROP CONSTRAINT {}",
        quote_ident(&ast.table),
        quote_ident(&format!("{}_{}_fkey", ast.table, ast.column)),
    )
}

/// Generate INSERT SQL with inline literal values.
pub fn build_insert(ast: &Insert) -> String {
    let columns = ast
        .values
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ");

    let values = ast
        .values
        .iter()
        .map(|(_, value)| value.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&ast.table),
        columns,
        values
    )
}
