//! Connection configuration.
//!
//! Consumed, not produced: loading these values from files or the
//! environment is the embedding application's business. Either form can
//! carry a driver selector and a debug flag; the debug flag gates
//! per-statement logging in the engine.

use serde::Deserialize;

use crate::error::{StratumError, StratumResult};

/// Supported drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Driver {
    Postgres,
}

impl std::str::FromStr for Driver {
    type Err = StratumError;

    fn from_str(s: &str) -> StratumResult<Self> {
        match s {
            "postgres" | "pg" => Ok(Driver::Postgres),
            other => Err(StratumError::Config(format!(
                "unknown driver '{}', expected one of: postgres, pg",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Driver {
    type Error = StratumError;

    fn try_from(s: String) -> StratumResult<Self> {
        s.parse()
    }
}

/// Connection configuration: a connection string or discrete parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConnectionConfig {
    Url {
        connection_string: String,
        driver: Option<Driver>,
        #[serde(default)]
        debug: bool,
    },
    Params {
        host: String,
        port: u16,
        username: String,
        password: String,
        database: String,
        driver: Option<Driver>,
        #[serde(default)]
        debug: bool,
    },
}

impl ConnectionConfig {
    pub fn url(connection_string: impl Into<String>) -> Self {
        ConnectionConfig::Url {
            connection_string: connection_string.into(),
            driver: Some(Driver::Postgres),
            debug: false,
        }
    }

    /// The configured driver; missing selectors are a configuration
    /// error, surfaced before any connection attempt.
    pub fn driver(&self) -> StratumResult<Driver> {
        let driver = match self {
            ConnectionConfig::Url { driver, .. } => driver,
            ConnectionConfig::Params { driver, .. } => driver,
        };

        driver.ok_or_else(|| {
            StratumError::Config("connection config has no \"driver\" property".into())
        })
    }

    pub fn debug(&self) -> bool {
        match self {
            ConnectionConfig::Url { debug, .. } => *debug,
            ConnectionConfig::Params { debug, .. } => *debug,
        }
    }
}
