pub mod ddl;
pub mod filter;
pub mod operators;
pub mod values;

pub use self::ddl::{
    AlterColumn, AlterTable, ColumnDef, ColumnType, CreateTable, DefaultValue, DropConstraint,
    DropTable, ForeignKey, Insert, TableKey,
};
pub use self::filter::{Filter, Selector};
pub use self::operators::{SetOp, SortOrder, WhereOp};
pub use self::values::Value;
