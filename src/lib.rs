//! # Turnstile
//!
//! Connection pool and query dispatcher for SQL backends.
//!
//! A driver admits queries and transactions, hands them to pooled
//! connections, queues them FIFO when every connection is busy, and
//! shuts down without dropping in-flight work. Dialect adapters supply
//! the connection URL, type decoding, and a default wire-protocol
//! backend; PostgreSQL ships in [`pg`].
//!
//! ## Quick example
//!
//! ```rust,ignore
//! use turnstile::prelude::*;
//!
//! let config = Config::new("pgsql")
//!     .host("localhost")
//!     .username("app")
//!     .password("secret")
//!     .database("app_main")
//!     .max_connections(8);
//!
//! let driver = turnstile::driver(config)?;
//! driver.start().await?;
//!
//! let output = driver.query("SELECT 1").await?;
//!
//! let mut tx = driver.begin().await?;
//! tx.query("UPDATE accounts SET balance = balance - 10 WHERE id = 1").await?;
//! tx.commit_with("UPDATE accounts SET balance = balance + 10 WHERE id = 2").await?;
//!
//! driver.stop().await?;
//! ```

pub use turnstile_core::backend;
pub use turnstile_core::{
    Compiler, CompilerKind, Config, Dialect, Driver, DriverOptions, DriverStatus, Error,
    IdentityCompiler, PoolStats, Query, Result, Statement, Transaction, XqlCompiler,
};
pub use turnstile_pg as pg;

use turnstile_core::config::validate_engine_name;

/// Resolve the configured engine and assemble its driver.
///
/// Engine tags match `[a-z_][a-z0-9_]*`; `pgsql` selects the PostgreSQL
/// adapter. An invalid or unknown tag fails with a configuration error.
/// Must be called from within a tokio runtime; the returned driver is
/// `pending` until started.
pub fn driver(config: Config) -> Result<Driver> {
    validate_engine_name(&config.engine)?;
    match config.engine.as_str() {
        "pgsql" => turnstile_pg::driver(config),
        other => Err(Error::configuration(format!("unknown engine `{other}`"))),
    }
}

pub mod prelude {
    pub use crate::backend::{Backend, Connection, QueryOutput, Row, Value};
    pub use crate::driver;
    pub use crate::{
        Config, Dialect, Driver, DriverStatus, Error, PoolStats, Query, Result, Transaction,
    };
}
