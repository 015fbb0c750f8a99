//! Error types for stratum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StratumError {
    /// Unrecognized or missing driver/connection selector.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pool connect or ping failure. Never retried here.
    #[error("connection error: {0}")]
    Connection(String),

    /// A model definition is malformed (duplicate field, unknown primary
    /// key, join colliding with a column, ...). Raised at construction.
    #[error("model definition error: {0}")]
    Definition(String),

    /// A filter, set, select or order-by entry names a logical field the
    /// model does not declare.
    #[error("unknown column: '{0}'")]
    UnknownColumn(String),

    /// An empty descriptor would compile to a statement matching every
    /// row. `Filter::All` is the explicit opt-in for that.
    #[error("empty filter matches every row; pass Filter::All to opt in explicitly")]
    EmptyFilter,

    /// A transaction handle was reused after commit/rollback, was never
    /// started, or is being driven from two places at once.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The execute contract reported a failure. Passed through as the
    /// driver reported it, never reinterpreted.
    #[error("query failed: {0}")]
    Query(String),

    /// Raised only by the `*_or_fail` operations.
    #[error("{model} not found")]
    NotFound { model: String },

    /// A migration ordering key failed to parse, or a previously-applied
    /// migration no longer has a definition.
    #[error("failed to load migrations: {0}")]
    MigrationLoad(String),

    /// A migration action failed inside its transaction. The transaction
    /// was rolled back and the remaining queue halted.
    #[error("migration '{name}' failed: {source}")]
    MigrationApply {
        name: String,
        #[source]
        source: Box<StratumError>,
    },
}

impl StratumError {
    /// Wrap a driver-reported failure.
    pub fn query(err: impl std::fmt::Display) -> Self {
        Self::Query(err.to_string())
    }

    /// Create a not-found fault for the given model name.
    pub fn not_found(model: impl Into<String>) -> Self {
        Self::NotFound {
            model: model.into(),
        }
    }
}

/// Result type alias for stratum operations.
pub type StratumResult<T> = Result<T, StratumError>;
