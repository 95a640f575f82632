//! Default backend over tokio-postgres.
//!
//! The pool's clients batch statements into single strings
//! (`"BEGIN;\n..."`), so dispatch goes through the simple-query
//! protocol, which executes multi-statement text in one round-trip.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_postgres::{NoTls, SimpleQueryMessage, SimpleQueryRow};
use tracing::warn;

use turnstile_core::backend::{
    Backend, Connection, ParserFormat, QueryOutput, Row, TypeParser, Value,
};
use turnstile_core::error::{Error, Result};

/// Backend factory connecting over TCP without TLS.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgBackend;

impl PgBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|err| Error::backend(err.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(error = %err, "postgres connection closed with error");
            }
        });
        Ok(Box::new(PgSession {
            client,
            parsers: HashMap::new(),
        }))
    }
}

/// One live session. The socket task ends when the session drops.
struct PgSession {
    client: tokio_postgres::Client,
    parsers: HashMap<(u32, ParserFormat), TypeParser>,
}

#[async_trait]
impl Connection for PgSession {
    async fn query(&mut self, sql: &str) -> Result<QueryOutput> {
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(|err| Error::backend(err.to_string()))?;
        let mut rows = Vec::new();
        let mut count = 0;
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => rows.push(decode_row(&self.parsers, &row)),
                SimpleQueryMessage::CommandComplete(affected) => count = affected,
                _ => {}
            }
        }
        Ok(QueryOutput { rows, count })
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the session tears down the socket task.
        Ok(())
    }

    fn install_type_parser(&mut self, oid: u32, format: ParserFormat, parser: TypeParser) {
        self.parsers.insert((oid, format), parser);
    }
}

fn decode_row(parsers: &HashMap<(u32, ParserFormat), TypeParser>, row: &SimpleQueryRow) -> Row {
    let columns = (0..row.len())
        .map(|index| match row.get(index) {
            // The simple protocol reports no column OIDs, so decoding
            // falls through to inference here.
            Some(text) => decode_column(parsers, None, text),
            None => Value::Null,
        })
        .collect();
    Row { columns }
}

/// Decode one text column, preferring an installed parser when the
/// column's OID is known.
fn decode_column(
    parsers: &HashMap<(u32, ParserFormat), TypeParser>,
    oid: Option<u32>,
    text: &str,
) -> Value {
    if let Some(oid) = oid {
        if let Some(parser) = parsers.get(&(oid, ParserFormat::Text)) {
            return parser(text.as_bytes());
        }
    }
    infer_value(text)
}

/// Map simple-protocol text output onto the transport value enum.
fn infer_value(text: &str) -> Value {
    if let Ok(int) = text.parse::<i64>() {
        return Value::Int(int);
    }
    if let Ok(float) = text.parse::<f64>() {
        return Value::Float(float);
    }
    match text {
        "t" | "true" => Value::Bool(true),
        "f" | "false" => Value::Bool(false),
        _ => Value::Text(text.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_infer_value() {
        assert_eq!(infer_value("42"), Value::Int(42));
        assert_eq!(infer_value("-7"), Value::Int(-7));
        assert_eq!(infer_value("2.5"), Value::Float(2.5));
        assert_eq!(infer_value("t"), Value::Bool(true));
        assert_eq!(infer_value("f"), Value::Bool(false));
        assert_eq!(infer_value("hello"), Value::Text("hello".to_owned()));
    }

    #[test]
    fn test_installed_parser_takes_priority() {
        let mut parsers: HashMap<(u32, ParserFormat), TypeParser> = HashMap::new();
        parsers.insert(
            (3802, ParserFormat::Text),
            Arc::new(|raw| {
                serde_json::from_slice(raw)
                    .map(Value::Json)
                    .unwrap_or(Value::Null)
            }),
        );
        let value = decode_column(&parsers, Some(3802), r#"{"a": 1}"#);
        assert_eq!(value, Value::Json(serde_json::json!({"a": 1})));
        // No OID reported: inference wins even with parsers installed.
        let value = decode_column(&parsers, None, "15");
        assert_eq!(value, Value::Int(15));
    }
}
