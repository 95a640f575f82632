//! User-facing transaction handle.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::client::Client;
use super::pool::Msg;
use crate::backend::QueryOutput;
use crate::compiler::{Compiler, Query};
use crate::error::{Error, Result};

enum Finalize {
    Commit(Option<String>),
    Rollback,
}

/// One open transaction, holding its connection until commit or
/// rollback.
///
/// The handle owns the pooled connection exclusively, so statements run
/// through it are strictly serialized. No `BEGIN` reaches the server
/// until the first statement does; a transaction that commits or rolls
/// back without dispatching anything costs no round-trips at all.
///
/// Dropping an unfinalized handle destroys the connection instead of
/// pooling it: the server side still has a transaction open.
pub struct Transaction {
    id: u64,
    client: Option<Client>,
    events: mpsc::UnboundedSender<Msg>,
    compiler: Arc<dyn Compiler>,
}

impl Transaction {
    pub(crate) fn new(
        client: Client,
        events: mpsc::UnboundedSender<Msg>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self {
            id: client.tx_id().unwrap_or_default(),
            client: Some(client),
            events,
            compiler,
        }
    }

    /// Identifier assigned by the driver when the transaction opened.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Compile and dispatch a statement inside the transaction.
    pub async fn query(&mut self, query: impl Into<Query>) -> Result<QueryOutput> {
        let sql = self.compiler.compile(&query.into())?;
        let client = self.client.as_mut().ok_or_else(Self::spent)?;
        client.query(&sql).await
    }

    /// Commit. An empty transaction resolves without touching the
    /// backend and yields no output.
    pub async fn commit(&mut self) -> Result<Option<QueryOutput>> {
        self.finalize(Finalize::Commit(None)).await
    }

    /// Commit with a trailing statement batched into the final
    /// round-trip.
    pub async fn commit_with(&mut self, query: impl Into<Query>) -> Result<Option<QueryOutput>> {
        let sql = self.compiler.compile(&query.into())?;
        self.finalize(Finalize::Commit(Some(sql))).await
    }

    /// Roll back. An empty transaction resolves without touching the
    /// backend.
    pub async fn rollback(&mut self) -> Result<Option<QueryOutput>> {
        self.finalize(Finalize::Rollback).await
    }

    async fn finalize(&mut self, kind: Finalize) -> Result<Option<QueryOutput>> {
        let mut client = self.client.take().ok_or_else(Self::spent)?;
        let result = match kind {
            Finalize::Commit(trailing) => client.commit(trailing.as_deref()).await,
            Finalize::Rollback => client.rollback().await,
        };
        let _ = self.events.send(Msg::Release { client });
        result
    }

    fn spent() -> Error {
        Error::transaction("transaction already finalized")
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.mark_failed();
            let _ = self.events.send(Msg::Release { client });
        }
    }
}
