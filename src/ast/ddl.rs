//! Schema-change ASTs.
//!
//! Structured, pre-render representations of DDL statements. Rendering to
//! SQL text lives in `transpiler::ddl`. Table and column identifiers and
//! raw default fragments are interpolated into the statement text, never
//! parameterized: these ASTs must only ever be built from trusted input.

use serde::{Deserialize, Serialize};

use crate::ast::Value;

/// Column type with a fixed Postgres rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Uuid,
    Text,
    /// VARCHAR with optional length limit
    Varchar(Option<u16>),
    SmallInt,
    Int,
    BigInt,
    Serial,
    BigSerial,
    Bool,
    Float,
    Jsonb,
    Timestamp,
    Timestamptz,
    Date,
    Bytea,
}

impl ColumnType {
    pub fn as_pg(&self) -> String {
        match self {
            Self::Uuid => "uuid".to_string(),
            Self::Text => "text".to_string(),
            Self::Varchar(None) => "varchar".to_string(),
            Self::Varchar(Some(len)) => format!("varchar({})", len),
            Self::SmallInt => "smallint".to_string(),
            Self::Int => "integer".to_string(),
            Self::BigInt => "bigint".to_string(),
            Self::Serial => "SERIAL".to_string(),
            Self::BigSerial => "BIGSERIAL".to_string(),
            Self::Bool => "boolean".to_string(),
            Self::Float => "double precision".to_string(),
            Self::Jsonb => "jsonb".to_string(),
            Self::Timestamp => "timestamp".to_string(),
            Self::Timestamptz => "timestamptz".to_string(),
            Self::Date => "date".to_string(),
            Self::Bytea => "bytea".to_string(),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_pg())
    }
}

/// A column default.
///
/// Numbers render as bare literals, strings as escaped quoted literals,
/// and `Raw` fragments verbatim (for server-side expressions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Int(i64),
    Float(f64),
    Str(String),
    Raw(String),
}

impl DefaultValue {
    /// Server-side current timestamp.
    pub fn now() -> Self {
        DefaultValue::Raw("now()".into())
    }

    /// Server-side generated v4 UUID.
    pub fn gen_uuid() -> Self {
        DefaultValue::Raw("gen_random_uuid()".into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        DefaultValue::Raw(sql.into())
    }
}

impl From<i64> for DefaultValue {
    fn from(n: i64) -> Self {
        DefaultValue::Int(n)
    }
}

impl From<i32> for DefaultValue {
    fn from(n: i32) -> Self {
        DefaultValue::Int(n as i64)
    }
}

impl From<f64> for DefaultValue {
    fn from(n: f64) -> Self {
        DefaultValue::Float(n)
    }
}

impl From<&str> for DefaultValue {
    fn from(s: &str) -> Self {
        DefaultValue::Str(s.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(s: String) -> Self {
        DefaultValue::Str(s)
    }
}

/// A column definition inside CREATE TABLE / ADD COLUMN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub data_type: ColumnType,
    pub primary_key: bool,
    pub unique: bool,
    pub not_null: bool,
    pub default: Option<DefaultValue>,
}

impl ColumnDef {
    pub fn new(data_type: ColumnType) -> Self {
        Self {
            data_type,
            primary_key: false,
            unique: false,
            not_null: false,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default(mut self, val: impl Into<DefaultValue>) -> Self {
        self.default = Some(val.into());
        self
    }
}

/// CREATE TABLE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub table: String,
    pub if_not_exists: bool,
    pub columns: Vec<(String, ColumnDef)>,
}

impl CreateTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            if_not_exists: false,
            columns: Vec::new(),
        }
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn column(mut self, name: impl Into<String>, def: ColumnDef) -> Self {
        self.columns.push((name.into(), def));
        self
    }
}

/// A per-column ALTER TABLE operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlterColumn {
    AddColumn(ColumnDef),
    DropColumn,
    SetDefault(DefaultValue),
    SetType(ColumnType),
}

/// ALTER TABLE with one or more per-column operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterTable {
    pub table: String,
    pub columns: Vec<(String, AlterColumn)>,
}

impl AlterTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn add_column(mut self, name: impl Into<String>, def: ColumnDef) -> Self {
        self.columns.push((name.into(), AlterColumn::AddColumn(def)));
        self
    }

    pub fn drop_column(mut self, name: impl Into<String>) -> Self {
        self.columns.push((name.into(), AlterColumn::DropColumn));
        self
    }

    pub fn set_default(mut self, name: impl Into<String>, val: impl Into<DefaultValue>) -> Self {
        self.columns
            .push((name.into(), AlterColumn::SetDefault(val.into())));
        self
    }

    pub fn set_type(mut self, name: impl Into<String>, data_type: ColumnType) -> Self {
        self.columns
            .push((name.into(), AlterColumn::SetType(data_type)));
        self
    }
}

/// DROP TABLE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTable {
    pub table: String,
}

impl DropTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

/// One side of a foreign-key relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableKey {
    pub table: String,
    pub column: String,
}

impl TableKey {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// ALTER TABLE ... ADD FOREIGN KEY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub foreign: TableKey,
    pub reference: TableKey,
}

/// ALTER TABLE ... DROP CONSTRAINT, targeting the conventional
/// `<table>_<column>_fkey` constraint name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropConstraint {
    pub table: String,
    pub column: String,
}

/// INSERT with inline literal values, for seeding data from migrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: String,
    pub values: Vec<(String, Value)>,
}

impl Insert {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }
}
