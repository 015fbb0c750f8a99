//! Migration definitions.
//!
//! A migration is a name plus an up and a down action. Actions receive a
//! transaction-bound [`SchemaOps`] surface and run entirely inside that
//! transaction. Names carry a 13-digit millisecond-epoch prefix that
//! orders the set: `1391877300255_create_cities`.

use std::future::Future;

use futures::future::BoxFuture;

use crate::error::{StratumError, StratumResult};
use crate::migrate::ops::SchemaOps;

/// Boxed async action over the schema-ops surface.
pub type MigrationAction =
    Box<dyn Fn(SchemaOps) -> BoxFuture<'static, StratumResult<()>> + Send + Sync>;

/// Which way a run goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// One migration definition. Immutable once registered.
pub struct Migration {
    name: String,
    up: Option<MigrationAction>,
    down: Option<MigrationAction>,
}

impl Migration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: None,
            down: None,
        }
    }

    pub fn up<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(SchemaOps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StratumResult<()>> + Send + 'static,
    {
        self.up = Some(Box::new(move |ops| Box::pin(action(ops))));
        self
    }

    pub fn down<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(SchemaOps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StratumResult<()>> + Send + 'static,
    {
        self.down = Some(Box::new(move |ops| Box::pin(action(ops))));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn action(&self, direction: Direction) -> Option<&MigrationAction> {
        match direction {
            Direction::Up => self.up.as_ref(),
            Direction::Down => self.down.as_ref(),
        }
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("up", &self.up.is_some())
            .field("down", &self.down.is_some())
            .finish()
    }
}

/// Parse the ordering key out of a migration name.
///
/// The canonical encoding is a 13-digit millisecond epoch followed by an
/// underscore and a title. Anything else fails loudly; a key that parses
/// wrong would silently misorder the whole set.
pub(crate) fn ordering_key(name: &str) -> StratumResult<i64> {
    let bad = || {
        StratumError::MigrationLoad(format!(
            "migration '{}' is not named '<13-digit millisecond epoch>_<title>'",
            name
        ))
    };

    let (prefix, title) = name.split_once('_').ok_or_else(bad)?;
    if title.is_empty() || prefix.len() != 13 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    prefix.parse::<i64>().map_err(|_| bad())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_key() {
        assert_eq!(
            ordering_key("1391877300255_create_cities").unwrap(),
            1391877300255
        );
    }

    #[test]
    fn test_malformed_keys_fail_loudly() {
        for name in [
            "create_cities",
            "20140208190500255_create_cities",
            "139187730025_create_cities",
            "1391877300255",
            "1391877300255_",
            "139187730025x_create_cities",
        ] {
            assert!(
                matches!(ordering_key(name), Err(StratumError::MigrationLoad(_))),
                "expected '{}' to be rejected",
                name
            );
        }
    }
}
