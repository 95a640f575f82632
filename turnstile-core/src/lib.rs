//! Core pool and dispatch machinery for turnstile.
//!
//! A [`Driver`] owns a bounded pool of backend connections, admits work
//! while running, queues requests FIFO when every connection is busy,
//! and shuts down without dropping in-flight work. A [`Transaction`]
//! checks one connection out of the pool and drives its transaction
//! state machine, sending the textual `BEGIN` along with the first real
//! statement.
//!
//! The wire protocol lives behind the [`backend`] seam; SQL generation
//! behind the [`compiler`] one.

pub mod backend;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod error;

pub use compiler::{Compiler, IdentityCompiler, Query, Statement, XqlCompiler};
pub use config::{CompilerKind, Config};
pub use dialect::Dialect;
pub use driver::{Driver, DriverOptions, DriverStatus, PoolStats, Transaction};
pub use error::{Error, Result};
