//! Scriptable in-memory backend for driver tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use turnstile_core::backend::{
    Backend, Connection, ParserFormat, QueryOutput, Row, TypeParser, Value,
};
use turnstile_core::error::{Error, Result};

/// Shared observation point for everything the driver does to the
/// backend.
pub struct MockState {
    /// Every dispatched statement, in service order across connections.
    pub log: Mutex<Vec<String>>,
    pub connect_attempts: AtomicU32,
    pub closed_connections: AtomicU32,
    pub installed: Mutex<Vec<(u32, ParserFormat)>>,
    fail_first_connects: AtomicU32,
    query_delay: Mutex<Option<Duration>>,
}

/// Backend whose connections record statements and succeed with a
/// one-row result. Statements containing `boom` fail; the first
/// `fail_first` connection attempts are refused.
#[derive(Clone)]
pub struct MockBackend {
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_first: u32) -> Self {
        Self {
            state: Arc::new(MockState {
                log: Mutex::new(Vec::new()),
                connect_attempts: AtomicU32::new(0),
                closed_connections: AtomicU32::new(0),
                installed: Mutex::new(Vec::new()),
                fail_first_connects: AtomicU32::new(fail_first),
                query_delay: Mutex::new(None),
            }),
        }
    }

    pub fn with_query_delay(delay: Duration) -> Self {
        let backend = Self::new();
        *backend.state.query_delay.lock().unwrap() = Some(delay);
        backend
    }

    pub fn log(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn closed_connections(&self) -> u32 {
        self.state.closed_connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>> {
        let attempt = self.state.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.state.fail_first_connects.load(Ordering::SeqCst) {
            return Err(Error::backend("connection refused"));
        }
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            parsers: HashMap::new(),
        }))
    }
}

pub struct MockConnection {
    state: Arc<MockState>,
    parsers: HashMap<(u32, ParserFormat), TypeParser>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&mut self, sql: &str) -> Result<QueryOutput> {
        let delay = *self.state.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.log.lock().unwrap().push(sql.to_owned());
        if sql.contains("boom") {
            return Err(Error::backend("forced query failure"));
        }
        Ok(QueryOutput {
            rows: vec![Row {
                columns: vec![Value::Int(1)],
            }],
            count: 1,
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.state.closed_connections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn install_type_parser(&mut self, oid: u32, format: ParserFormat, parser: TypeParser) {
        self.state.installed.lock().unwrap().push((oid, format));
        self.parsers.insert((oid, format), parser);
    }
}

/// Route tracing output through the test harness when a test opts in.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
