//! Descriptor-driven data access and transactional schema migrations.
//!
//! Filter/update/join descriptors compile into parameterized SQL executed
//! through the [`executor::Executor`] contract; the [`migrate`] engine
//! orders and transactionally applies schema changes. One Postgres
//! binding of the contract ships in [`engine`].

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod migrate;
pub mod model;
pub mod transpiler;

pub use error::{StratumError, StratumResult};

pub mod prelude {
    pub use crate::ast::{
        AlterTable, ColumnDef, ColumnType, CreateTable, DefaultValue, Filter, Insert, Selector,
        SetOp, SortOrder, TableKey, Value, WhereOp,
    };
    pub use crate::config::{ConnectionConfig, Driver};
    pub use crate::engine::{PgEngine, connect};
    pub use crate::error::{StratumError, StratumResult};
    pub use crate::executor::{Executor, Row, Tx};
    pub use crate::migrate::{Direction, Migration, Runner, SchemaOps};
    pub use crate::model::{
        Database, FindOptions, JoinDef, JoinSpec, Model, ModelDef, Returning, UpdateOptions,
    };
}
