//! The seam to the wire-protocol driver.
//!
//! The pool never speaks a database protocol itself. It drives a
//! [`Backend`] factory that produces [`Connection`] handles; rows travel
//! back as untyped [`Value`] columns and real deserialization stays on
//! the other side of the seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Result of one dispatched statement (or statement batch).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    /// Rows returned or affected, as reported by the backend.
    pub count: u64,
}

/// A single result row of untyped columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub columns: Vec<Value>,
}

/// Untyped column value transported across the backend seam.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

/// Wire format a type parser consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserFormat {
    Text,
    Binary,
}

/// Decoder for one type OID: raw column bytes in, [`Value`] out.
pub type TypeParser = Arc<dyn Fn(&[u8]) -> Value + Send + Sync>;

/// A type referenced either by numeric OID or by well-known name.
///
/// Symbolic names are resolved by the dialect adapter when the
/// configuration is normalized; an unknown name is a configuration
/// error, never a query-time one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Oid(u32),
    Name(String),
}

/// One configured `{type, format, parser}` entry, before the dialect
/// adapter resolves symbolic names to OIDs.
#[derive(Clone)]
pub struct TypeParserSpec {
    pub type_ref: TypeRef,
    pub format: ParserFormat,
    pub parser: TypeParser,
}

impl TypeParserSpec {
    /// Parser entry for a symbolic type name such as `"JSONB"`.
    pub fn named(name: impl Into<String>, format: ParserFormat, parser: TypeParser) -> Self {
        Self {
            type_ref: TypeRef::Name(name.into()),
            format,
            parser,
        }
    }

    /// Parser entry for a numeric OID.
    pub fn by_oid(oid: u32, format: ParserFormat, parser: TypeParser) -> Self {
        Self {
            type_ref: TypeRef::Oid(oid),
            format,
            parser,
        }
    }
}

impl fmt::Debug for TypeParserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeParserSpec")
            .field("type_ref", &self.type_ref)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Factory producing raw connections.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Establish one connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// One live connection.
///
/// Queries take `&mut self`, so at most one statement is ever
/// outstanding per connection.
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement, or a `;`-joined batch, and collect its result.
    async fn query(&mut self, sql: &str) -> Result<QueryOutput>;

    /// Release the server-side session.
    async fn close(&mut self) -> Result<()>;

    /// Register a decoder for one type OID.
    fn install_type_parser(&mut self, oid: u32, format: ParserFormat, parser: TypeParser);
}
