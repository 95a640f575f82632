//! The pool owner task.
//!
//! All pool state lives here: the status machine, the FIFO work queue,
//! the LIFO idle pool, the counters, the connection-failure budget, and
//! the delayed-stop slot. Commands from driver handles and completion
//! events from worker tasks arrive on one mailbox, so every mutation is
//! serialized without locks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace};

use super::client::Client;
use super::transaction::Transaction;
use super::{DriverOptions, DriverStatus, PoolStats};
use crate::backend::{Backend, Connection, QueryOutput};
use crate::compiler::Compiler;
use crate::error::{Error, Result};

/// Mailbox traffic for the owner task: public commands and internal
/// completion events share one channel.
pub(crate) enum Msg {
    Start {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    Query {
        sql: String,
        reply: oneshot::Sender<Result<QueryOutput>>,
    },
    Begin {
        reply: oneshot::Sender<Result<Transaction>>,
    },
    Stats {
        reply: oneshot::Sender<Result<PoolStats>>,
    },
    Connected(Box<dyn Connection>),
    ConnectFailed(Error),
    Release {
        client: Client,
    },
}

/// A queued unit of work. Transaction-open requests wait in the same
/// FIFO as plain queries.
enum Job {
    Query {
        sql: String,
        reply: oneshot::Sender<Result<QueryOutput>>,
    },
    Begin {
        reply: oneshot::Sender<Result<Transaction>>,
    },
}

impl Job {
    fn operation(&self) -> &'static str {
        match self {
            Job::Query { .. } => "query",
            Job::Begin { .. } => "begin",
        }
    }

    fn fail(self, err: Error) {
        match self {
            Job::Query { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Job::Begin { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

pub(crate) struct PoolCore {
    url: String,
    backend: Arc<dyn Backend>,
    compiler: Arc<dyn Compiler>,
    status: DriverStatus,
    status_cell: Arc<AtomicU8>,
    events: mpsc::WeakUnboundedSender<Msg>,
    queue: VecDeque<Job>,
    idle: Vec<Client>,
    clients_count: u32,
    clients_active: u32,
    clients_minimum: u32,
    clients_maximum: u32,
    failures_count: u32,
    failures_maximum: u32,
    ever_connected: bool,
    next_tx_id: u64,
    pending_stop: Option<oneshot::Sender<Result<()>>>,
    debug_queries: bool,
    debug_results: bool,
}

impl PoolCore {
    pub(crate) fn new(
        options: DriverOptions,
        events: mpsc::WeakUnboundedSender<Msg>,
        status_cell: Arc<AtomicU8>,
    ) -> Self {
        Self {
            url: options.url,
            backend: options.backend,
            compiler: options.compiler,
            status: DriverStatus::Pending,
            status_cell,
            events,
            queue: VecDeque::new(),
            idle: Vec::new(),
            clients_count: 0,
            clients_active: 0,
            clients_minimum: options.clients_minimum,
            clients_maximum: options.clients_maximum,
            failures_count: 0,
            failures_maximum: options.failures_maximum,
            ever_connected: false,
            next_tx_id: 0,
            pending_stop: None,
            debug_queries: options.debug_queries,
            debug_results: options.debug_results,
        }
    }

    /// Serve the mailbox until every handle, worker, and transaction is
    /// gone.
    pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = inbox.recv().await {
            match msg {
                Msg::Start { reply } => self.on_start(reply),
                Msg::Stop { reply } => self.on_stop(reply),
                Msg::Query { sql, reply } => self.on_query(sql, reply),
                Msg::Begin { reply } => self.on_begin(reply),
                Msg::Stats { reply } => {
                    let _ = reply.send(Ok(self.stats()));
                }
                Msg::Connected(conn) => self.on_connected(conn),
                Msg::ConnectFailed(err) => self.on_connect_failed(err),
                Msg::Release { client } => self.on_release(client),
            }
        }
    }

    fn set_status(&mut self, status: DriverStatus) {
        self.status = status;
        self.status_cell.store(status as u8, Ordering::Release);
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            status: self.status,
            clients_count: self.clients_count,
            clients_active: self.clients_active,
            clients_minimum: self.clients_minimum,
            clients_maximum: self.clients_maximum,
            idle: self.idle.len(),
            queued: self.queue.len(),
            failures_count: self.failures_count,
            failures_maximum: self.failures_maximum,
        }
    }

    fn on_start(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.status != DriverStatus::Pending {
            let _ = reply.send(Err(Error::state("start", self.status)));
            return;
        }
        self.set_status(DriverStatus::Starting);
        self.set_status(DriverStatus::Running);
        trace!("driver running");
        let _ = reply.send(Ok(()));
    }

    fn on_stop(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.status != DriverStatus::Running {
            let _ = reply.send(Err(Error::state("stop", self.status)));
            return;
        }
        self.set_status(DriverStatus::Stopping);
        // Nothing queued can be served anymore: released clients are
        // destroyed during shutdown, never recycled. Answer the queue
        // now so every admitted request still gets its one reply.
        while let Some(job) = self.queue.pop_front() {
            let operation = job.operation();
            job.fail(Error::state(operation, DriverStatus::Stopping));
        }
        if self.clients_active > 0 {
            self.pending_stop = Some(reply);
            trace!(active = self.clients_active, "stop deferred until drain");
            return;
        }
        self.destroy_pool();
        self.set_status(DriverStatus::Stopped);
        let _ = reply.send(Ok(()));
    }

    fn on_query(&mut self, sql: String, reply: oneshot::Sender<Result<QueryOutput>>) {
        if self.status != DriverStatus::Running {
            let _ = reply.send(Err(Error::state("query", self.status)));
            return;
        }
        if let Some(client) = self.idle.pop() {
            self.clients_active += 1;
            self.spawn_query(client, sql, reply);
        } else {
            self.queue.push_back(Job::Query { sql, reply });
            self.schedule();
        }
    }

    fn on_begin(&mut self, reply: oneshot::Sender<Result<Transaction>>) {
        if self.status != DriverStatus::Running {
            let _ = reply.send(Err(Error::state("begin", self.status)));
            return;
        }
        if let Some(client) = self.idle.pop() {
            self.clients_active += 1;
            self.dispatch_begin(client, reply);
        } else {
            self.queue.push_back(Job::Begin { reply });
            self.schedule();
        }
    }

    /// Serve the queue head: an idle connection if one exists, a fresh
    /// connection if the pool is below its ceiling, otherwise wait for a
    /// release.
    fn schedule(&mut self) {
        while !self.queue.is_empty() {
            if let Some(client) = self.idle.pop() {
                self.clients_active += 1;
                if let Some(job) = self.queue.pop_front() {
                    self.dispatch(client, job);
                }
                continue;
            }
            if self.clients_count < self.clients_maximum {
                self.clients_count += 1;
                self.spawn_connect();
            }
            return;
        }
    }

    fn dispatch(&mut self, client: Client, job: Job) {
        match job {
            Job::Query { sql, reply } => self.spawn_query(client, sql, reply),
            Job::Begin { reply } => self.dispatch_begin(client, reply),
        }
    }

    fn spawn_query(
        &self,
        mut client: Client,
        sql: String,
        reply: oneshot::Sender<Result<QueryOutput>>,
    ) {
        let Some(events) = self.events.upgrade() else {
            Self::destroy_client(client);
            return;
        };
        tokio::spawn(async move {
            let result = client.query(&sql).await;
            let _ = events.send(Msg::Release { client });
            let _ = reply.send(result);
        });
    }

    fn dispatch_begin(&mut self, mut client: Client, reply: oneshot::Sender<Result<Transaction>>) {
        self.next_tx_id += 1;
        match client.begin(self.next_tx_id) {
            Ok(()) => {
                let Some(events) = self.events.upgrade() else {
                    Self::destroy_client(client);
                    return;
                };
                let tx = Transaction::new(client, events, self.compiler.clone());
                // A rejected send drops the transaction, whose Drop
                // releases the client back to this task.
                let _ = reply.send(Ok(tx));
            }
            Err(err) => {
                let _ = reply.send(Err(err));
                self.on_release(client);
            }
        }
    }

    fn spawn_connect(&mut self) {
        let Some(events) = self.events.upgrade() else {
            self.clients_count -= 1;
            return;
        };
        let backend = self.backend.clone();
        let url = self.url.clone();
        trace!(clients = self.clients_count, "requesting a new connection");
        tokio::spawn(async move {
            match backend.connect(&url).await {
                Ok(conn) => {
                    let _ = events.send(Msg::Connected(conn));
                }
                Err(err) => {
                    let _ = events.send(Msg::ConnectFailed(err));
                }
            }
        });
    }

    fn on_connected(&mut self, conn: Box<dyn Connection>) {
        self.ever_connected = true;
        if self.status != DriverStatus::Running {
            // Raced a shutdown; the connection never enters the pool.
            self.clients_count -= 1;
            Self::destroy_conn(conn);
            return;
        }
        trace!(clients = self.clients_count, "connection established");
        let client = Client::new(conn, self.debug_queries, self.debug_results);
        self.clients_active += 1;
        self.client_idle(client);
        self.schedule();
    }

    fn on_connect_failed(&mut self, err: Error) {
        error!(error = %err, "connection attempt failed");
        self.clients_count -= 1;
        self.failures_count += 1;
        if self.clients_count > 0 {
            // Another connection is live or in flight; a later schedule
            // pass retries for this request.
            return;
        }
        if self.ever_connected || self.failures_count < self.failures_maximum {
            self.schedule();
            return;
        }
        // The pool never produced a live connection and the budget is
        // spent: answer everything still queued and shut down.
        let terminal = Error::backend(format!(
            "gave up connecting after {} failures",
            self.failures_count
        ));
        while let Some(job) = self.queue.pop_front() {
            job.fail(terminal.clone());
        }
        self.destroy_pool();
        self.set_status(DriverStatus::Stopped);
        error!("connection failure budget exhausted, driver stopped");
    }

    /// A unit of work finished with this client.
    fn on_release(&mut self, client: Client) {
        if self.status == DriverStatus::Running && !client.failed() && client.returns_to_pool() {
            self.park(client);
        } else {
            self.clients_active -= 1;
            self.clients_count -= 1;
            trace!(
                last_sql = client.last_sql().unwrap_or(""),
                "destroying client"
            );
            Self::destroy_client(client);
        }
        self.after_idle();
        self.schedule();
    }

    /// A freshly created client serves the queue head or parks.
    fn client_idle(&mut self, client: Client) {
        if let Some(job) = self.queue.pop_front() {
            self.dispatch(client, job);
        } else {
            self.park(client);
        }
    }

    fn park(&mut self, mut client: Client) {
        client.reset();
        self.clients_active -= 1;
        self.idle.push(client);
        trace!(idle = self.idle.len(), "client returned to pool");
    }

    fn after_idle(&mut self) {
        if self.clients_active == 0 && self.status == DriverStatus::Stopping {
            self.destroy_pool();
            self.set_status(DriverStatus::Stopped);
            if let Some(reply) = self.pending_stop.take() {
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn destroy_pool(&mut self) {
        while let Some(client) = self.idle.pop() {
            self.clients_count -= 1;
            Self::destroy_client(client);
        }
    }

    fn destroy_client(mut client: Client) {
        tokio::spawn(async move {
            let _ = client.close().await;
        });
    }

    fn destroy_conn(mut conn: Box<dyn Connection>) {
        tokio::spawn(async move {
            let _ = conn.close().await;
        });
    }
}
