//! Pluggable query compilation.
//!
//! The driver accepts either raw SQL text or a structured statement that
//! renders itself for a dialect. The configured [`Compiler`] decides
//! which forms are accepted and produces the SQL string that is
//! ultimately dispatched.

use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// A structured statement that knows how to render itself for a dialect.
pub trait Statement: Send + Sync {
    /// Render this statement as SQL text for `dialect`.
    fn compile(&self, dialect: Dialect) -> String;
}

/// Input to a query operation: raw SQL or a structured statement.
#[derive(Clone)]
pub enum Query {
    Sql(String),
    Statement(Arc<dyn Statement>),
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::Sql(sql.to_owned())
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::Sql(sql)
    }
}

impl From<Arc<dyn Statement>> for Query {
    fn from(statement: Arc<dyn Statement>) -> Self {
        Query::Statement(statement)
    }
}

/// Turns accepted query inputs into dispatchable SQL text.
pub trait Compiler: Send + Sync {
    fn compile(&self, query: &Query) -> Result<String>;
}

/// The default compiler: raw SQL passes through untouched.
///
/// Structured statements need a dialect context to render, which this
/// compiler does not carry, so they are rejected at compile time.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCompiler;

impl Compiler for IdentityCompiler {
    fn compile(&self, query: &Query) -> Result<String> {
        match query {
            Query::Sql(sql) => Ok(sql.clone()),
            Query::Statement(_) => Err(Error::configuration(
                "structured statements require the xql compiler",
            )),
        }
    }
}

/// Dialect-aware compiler, selected by the `xql` configuration tag.
#[derive(Debug, Clone, Copy)]
pub struct XqlCompiler {
    dialect: Dialect,
}

impl XqlCompiler {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

impl Compiler for XqlCompiler {
    fn compile(&self, query: &Query) -> Result<String> {
        match query {
            Query::Sql(sql) => Ok(sql.clone()),
            Query::Statement(statement) => Ok(statement.compile(self.dialect)),
        }
    }
}
