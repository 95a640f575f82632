//! One backend connection bound to a transaction state machine.

use tracing::{debug, error};

use crate::backend::{Connection, QueryOutput};
use crate::error::{Error, Result};

/// Transaction phase, tracked per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxPhase {
    /// Open, nothing dispatched yet. No `BEGIN` has reached the server.
    Empty,
    /// At least one statement dispatched; `BEGIN` went with the first.
    Active,
    /// `COMMIT` dispatched.
    Committing,
    /// `ROLLBACK` dispatched.
    RollingBack,
}

#[derive(Debug, Clone, Copy)]
struct Tx {
    id: u64,
    phase: TxPhase,
}

/// A pooled connection plus its transaction bookkeeping.
///
/// A client belongs to exactly one unit of work at a time: it is either
/// executing, parked in the idle pool, or destroyed. The owner task
/// enforces that; the client itself only tracks the transaction state
/// machine and the sticky failure flag.
pub(crate) struct Client {
    conn: Box<dyn Connection>,
    tx: Option<Tx>,
    failed: bool,
    return_to_pool: bool,
    last_sql: Option<String>,
    debug_queries: bool,
    debug_results: bool,
}

impl Client {
    pub(crate) fn new(conn: Box<dyn Connection>, debug_queries: bool, debug_results: bool) -> Self {
        Self {
            conn,
            tx: None,
            failed: false,
            return_to_pool: true,
            last_sql: None,
            debug_queries,
            debug_results,
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.failed
    }

    pub(crate) fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub(crate) fn returns_to_pool(&self) -> bool {
        self.return_to_pool
    }

    pub(crate) fn tx_id(&self) -> Option<u64> {
        self.tx.as_ref().map(|tx| tx.id)
    }

    pub(crate) fn last_sql(&self) -> Option<&str> {
        self.last_sql.as_deref()
    }

    /// Reset transaction bookkeeping on entry to the idle pool.
    pub(crate) fn reset(&mut self) {
        self.tx = None;
        self.return_to_pool = true;
        self.last_sql = None;
    }

    pub(crate) async fn close(&mut self) -> Result<()> {
        self.conn.close().await
    }

    /// Open a transaction. Fails if one is already open.
    pub(crate) fn begin(&mut self, id: u64) -> Result<()> {
        if let Some(tx) = &self.tx {
            return Err(Error::transaction(format!(
                "transaction {} is already open",
                tx.id
            )));
        }
        self.tx = Some(Tx {
            id,
            phase: TxPhase::Empty,
        });
        self.return_to_pool = false;
        Ok(())
    }

    /// Dispatch a statement. Inside a transaction the first statement
    /// carries the `BEGIN` with it, saving a round-trip.
    pub(crate) async fn query(&mut self, sql: &str) -> Result<QueryOutput> {
        let sql = match self.tx.as_mut() {
            Some(tx) if tx.phase == TxPhase::Empty => {
                tx.phase = TxPhase::Active;
                format!("BEGIN;\n{sql}")
            }
            _ => sql.to_owned(),
        };
        self.dispatch(sql).await
    }

    /// Commit the open transaction, optionally batching a trailing
    /// statement into the final round-trip. A transaction that never
    /// dispatched anything commits without touching the backend.
    pub(crate) async fn commit(&mut self, trailing: Option<&str>) -> Result<Option<QueryOutput>> {
        let phase = match &self.tx {
            Some(tx) => tx.phase,
            None => return Err(Error::transaction("commit outside of a transaction")),
        };
        self.return_to_pool = true;
        let sql = match (phase, trailing) {
            (TxPhase::Empty, None) => {
                self.tx = None;
                return Ok(None);
            }
            (TxPhase::Empty, Some(q)) => format!("BEGIN;\n{q}\nCOMMIT;"),
            (_, Some(q)) => format!("{q}\nCOMMIT;"),
            (_, None) => String::from("COMMIT;"),
        };
        if let Some(tx) = self.tx.as_mut() {
            tx.phase = TxPhase::Committing;
        }
        let result = self.dispatch(sql).await;
        self.tx = None;
        result.map(Some)
    }

    /// Roll back the open transaction. Emits nothing when nothing was
    /// dispatched.
    pub(crate) async fn rollback(&mut self) -> Result<Option<QueryOutput>> {
        let phase = match &self.tx {
            Some(tx) => tx.phase,
            None => return Err(Error::transaction("rollback outside of a transaction")),
        };
        self.return_to_pool = true;
        if phase == TxPhase::Empty {
            self.tx = None;
            return Ok(None);
        }
        if let Some(tx) = self.tx.as_mut() {
            tx.phase = TxPhase::RollingBack;
        }
        let result = self.dispatch(String::from("ROLLBACK;")).await;
        self.tx = None;
        result.map(Some)
    }

    async fn dispatch(&mut self, sql: String) -> Result<QueryOutput> {
        if self.debug_queries {
            debug!(sql = %sql, "dispatching statement");
        }
        let result = self.conn.query(&sql).await;
        match result {
            Ok(output) => {
                if self.debug_results {
                    debug!(
                        rows = output.rows.len(),
                        count = output.count,
                        "statement complete"
                    );
                }
                self.last_sql = Some(sql);
                Ok(output)
            }
            Err(err) => {
                error!(sql = %sql, error = %err, "statement failed");
                self.failed = true;
                self.last_sql = Some(sql);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::{ParserFormat, TypeParser};

    struct ScriptedConn {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Connection for ScriptedConn {
        async fn query(&mut self, sql: &str) -> Result<QueryOutput> {
            self.log.lock().unwrap().push(sql.to_owned());
            if sql.contains("boom") {
                return Err(Error::backend("bad statement"));
            }
            Ok(QueryOutput::default())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn install_type_parser(&mut self, _: u32, _: ParserFormat, _: TypeParser) {}
    }

    fn client() -> (Client, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let conn = ScriptedConn { log: log.clone() };
        (Client::new(Box::new(conn), false, false), log)
    }

    #[tokio::test]
    async fn test_lazy_begin_prefixes_first_statement() {
        let (mut client, log) = client();
        client.begin(1).unwrap();
        client.query("UPDATE t SET x=1").await.unwrap();
        client.query("UPDATE t SET y=2").await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["BEGIN;\nUPDATE t SET x=1", "UPDATE t SET y=2"]
        );
    }

    #[tokio::test]
    async fn test_empty_commit_is_silent() {
        let (mut client, log) = client();
        client.begin(1).unwrap();
        let output = client.commit(None).await.unwrap();
        assert!(output.is_none());
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(client.tx_id(), None);
        assert!(client.returns_to_pool());
    }

    #[tokio::test]
    async fn test_empty_rollback_is_silent() {
        let (mut client, log) = client();
        client.begin(1).unwrap();
        let output = client.rollback().await.unwrap();
        assert!(output.is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_after_statement() {
        let (mut client, log) = client();
        client.begin(1).unwrap();
        client.query("UPDATE t SET x=1").await.unwrap();
        let output = client.commit(None).await.unwrap();
        assert!(output.is_some());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["BEGIN;\nUPDATE t SET x=1", "COMMIT;"]
        );
    }

    #[tokio::test]
    async fn test_commit_with_trailing_statement() {
        let (mut client, log) = client();
        client.begin(1).unwrap();
        client.query("X").await.unwrap();
        client.commit(Some("Y")).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN;\nX", "Y\nCOMMIT;"]);
    }

    #[tokio::test]
    async fn test_commit_with_trailing_statement_on_empty_transaction() {
        let (mut client, log) = client();
        client.begin(1).unwrap();
        client.commit(Some("INSERT INTO t VALUES(1)")).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["BEGIN;\nINSERT INTO t VALUES(1)\nCOMMIT;"]
        );
    }

    #[tokio::test]
    async fn test_rollback_after_statement() {
        let (mut client, log) = client();
        client.begin(1).unwrap();
        client.query("X").await.unwrap();
        client.rollback().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN;\nX", "ROLLBACK;"]);
    }

    #[tokio::test]
    async fn test_begin_twice_rejected() {
        let (mut client, _log) = client();
        client.begin(1).unwrap();
        let err = client.begin(2).unwrap_err();
        assert!(matches!(err, Error::TransactionState(_)));
    }

    #[tokio::test]
    async fn test_commit_outside_transaction_rejected() {
        let (mut client, _log) = client();
        let err = client.commit(None).await.unwrap_err();
        assert!(matches!(err, Error::TransactionState(_)));
        let err = client.rollback().await.unwrap_err();
        assert!(matches!(err, Error::TransactionState(_)));
    }

    #[tokio::test]
    async fn test_failure_is_sticky() {
        let (mut client, _log) = client();
        assert!(!client.failed());
        let err = client.query("boom").await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(client.failed());
        client.query("SELECT 1").await.unwrap();
        assert!(client.failed());
        assert_eq!(client.last_sql(), Some("SELECT 1"));
    }
}
