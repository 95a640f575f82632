//! Driver: pool lifecycle, admission control, and work dispatch.
//!
//! The driver is split across modules:
//! - `pool.rs` - the owner task: status machine, FIFO work queue, idle
//!   pool, counters, failure budget, shutdown drain
//! - `client.rs` - one backend connection bound to a transaction state
//!   machine
//! - `transaction.rs` - the user-facing transaction handle
//!
//! Every piece of pool state is mutated by exactly one task. The public
//! [`Driver`] is a cheap clone that posts messages to that task and
//! reads replies back, so results are never delivered on the caller's
//! stack.

mod client;
mod pool;
mod transaction;

pub use transaction::Transaction;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::backend::{Backend, QueryOutput};
use crate::compiler::{Compiler, IdentityCompiler, Query};
use crate::config::{DEFAULT_MAXIMUM_FAILURES, DEFAULT_MAX_CONNECTIONS};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use pool::{Msg, PoolCore};

/// Driver lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverStatus {
    Pending = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl DriverStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => DriverStatus::Pending,
            1 => DriverStatus::Starting,
            2 => DriverStatus::Running,
            3 => DriverStatus::Stopping,
            _ => DriverStatus::Stopped,
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverStatus::Pending => "pending",
            DriverStatus::Starting => "starting",
            DriverStatus::Running => "running",
            DriverStatus::Stopping => "stopping",
            DriverStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub status: DriverStatus,
    /// Connections created and not yet destroyed, including in-progress
    /// creations.
    pub clients_count: u32,
    /// Connections currently handed out to work.
    pub clients_active: u32,
    pub clients_minimum: u32,
    pub clients_maximum: u32,
    /// Connections parked in the idle pool.
    pub idle: usize,
    /// Requests waiting for a connection.
    pub queued: usize,
    pub failures_count: u32,
    pub failures_maximum: u32,
}

/// Everything needed to spawn a driver.
pub struct DriverOptions {
    dialect: Dialect,
    url: String,
    backend: Arc<dyn Backend>,
    compiler: Arc<dyn Compiler>,
    clients_minimum: u32,
    clients_maximum: u32,
    failures_maximum: u32,
    debug_queries: bool,
    debug_results: bool,
}

impl DriverOptions {
    pub fn new(dialect: Dialect, url: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            dialect,
            url: url.into(),
            backend,
            compiler: Arc::new(IdentityCompiler),
            clients_minimum: 0,
            clients_maximum: DEFAULT_MAX_CONNECTIONS,
            failures_maximum: DEFAULT_MAXIMUM_FAILURES,
            debug_queries: false,
            debug_results: false,
        }
    }

    pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn clients_minimum(mut self, min: u32) -> Self {
        self.clients_minimum = min;
        self
    }

    pub fn clients_maximum(mut self, max: u32) -> Self {
        self.clients_maximum = max;
        self
    }

    pub fn failures_maximum(mut self, max: u32) -> Self {
        self.failures_maximum = max;
        self
    }

    pub fn debug_queries(mut self, enabled: bool) -> Self {
        self.debug_queries = enabled;
        self
    }

    pub fn debug_results(mut self, enabled: bool) -> Self {
        self.debug_results = enabled;
        self
    }
}

/// Handle to a driver task. Clones share the same pool.
///
/// # Example
///
/// ```rust,ignore
/// let driver = Driver::new(DriverOptions::new(Dialect::Pgsql, url, backend));
/// driver.start().await?;
/// let output = driver.query("SELECT 1").await?;
/// driver.stop().await?;
/// ```
#[derive(Clone)]
pub struct Driver {
    commands: mpsc::UnboundedSender<Msg>,
    status: Arc<AtomicU8>,
    dialect: Dialect,
    compiler: Arc<dyn Compiler>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("status", &self.status())
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl Driver {
    /// Spawn the owner task for a new pool. The driver starts out
    /// `pending`; call [`start`](Self::start) before dispatching work.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(options: DriverOptions) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let status = Arc::new(AtomicU8::new(DriverStatus::Pending as u8));
        let dialect = options.dialect;
        let compiler = options.compiler.clone();
        let core = PoolCore::new(options, commands.downgrade(), status.clone());
        tokio::spawn(core.run(inbox));
        Self {
            commands,
            status,
            dialect,
            compiler,
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> DriverStatus {
        DriverStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// The dialect this driver was assembled for.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Transition `pending` -> `running`. Fails in any other status.
    pub async fn start(&self) -> Result<()> {
        self.round_trip("start", |reply| Msg::Start { reply }).await
    }

    /// Stop accepting work and shut down once active connections drain.
    ///
    /// In-flight work runs to completion; the returned future resolves
    /// only after the last active connection is released and the idle
    /// pool is destroyed.
    pub async fn stop(&self) -> Result<()> {
        self.round_trip("stop", |reply| Msg::Stop { reply }).await
    }

    /// Compile and dispatch a query on a pooled connection, queueing it
    /// if none is idle.
    pub async fn query(&self, query: impl Into<Query>) -> Result<QueryOutput> {
        let sql = self.compiler.compile(&query.into())?;
        self.round_trip("query", |reply| Msg::Query { sql, reply })
            .await
    }

    /// Open a transaction, taking a connection out of the pool until it
    /// commits or rolls back.
    pub async fn begin(&self) -> Result<Transaction> {
        self.round_trip("begin", |reply| Msg::Begin { reply }).await
    }

    /// Dispatch a query on an open transaction instead of the pool.
    pub async fn query_in(
        &self,
        tx: &mut Transaction,
        query: impl Into<Query>,
    ) -> Result<QueryOutput> {
        tx.query(query).await
    }

    /// Snapshot of the pool counters.
    pub async fn stats(&self) -> Result<PoolStats> {
        self.round_trip("stats", |reply| Msg::Stats { reply }).await
    }

    async fn round_trip<T>(
        &self,
        operation: &'static str,
        message: impl FnOnce(oneshot::Sender<Result<T>>) -> Msg,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(message(reply))
            .map_err(|_| Error::state(operation, self.status()))?;
        response
            .await
            .map_err(|_| Error::state(operation, self.status()))?
    }
}
