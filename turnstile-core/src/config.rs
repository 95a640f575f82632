//! Driver configuration.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::backend::{Backend, TypeParserSpec};
use crate::error::{Error, Result};

/// Upper bound on pooled connections unless configured otherwise.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Connection-establishment failures tolerated before a pool that has
/// never held a live connection gives up.
pub const DEFAULT_MAXIMUM_FAILURES: u32 = 20;

/// Which compiler turns query inputs into SQL text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerKind {
    #[default]
    Identity,
    Xql,
}

impl FromStr for CompilerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" => Ok(CompilerKind::Identity),
            "xql" => Ok(CompilerKind::Xql),
            other => Err(Error::configuration(format!("unknown compiler `{other}`"))),
        }
    }
}

/// Recognized driver options.
///
/// The declarative keys deserialize from configuration files; the
/// capability fields (a pre-supplied backend, type-parser closures) are
/// builder-only.
///
/// # Example
///
/// ```
/// use turnstile_core::config::Config;
///
/// let config = Config::new("pgsql")
///     .host("db.internal")
///     .username("app")
///     .database("app_main")
///     .max_connections(8);
/// assert_eq!(config.max_connections, 8);
/// ```
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Engine tag selecting the dialect adapter, e.g. `pgsql`.
    pub engine: String,

    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,

    /// Reserved connection floor. Recorded but not enforced by the pool.
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_maximum_failures")]
    pub maximum_failures: u32,

    /// Log every dispatched statement at debug level.
    #[serde(default)]
    pub debug_queries: bool,
    /// Log result sizes at debug level.
    #[serde(default)]
    pub debug_results: bool,

    #[serde(default)]
    pub compiler: CompilerKind,

    /// Pre-supplied backend factory. When absent the dialect adapter
    /// loads its default.
    #[serde(skip)]
    pub backend: Option<Arc<dyn Backend>>,

    /// Dialect-specific type-parser entries, resolved by the adapter at
    /// configuration time.
    #[serde(skip)]
    pub type_parsers: Vec<TypeParserSpec>,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_maximum_failures() -> u32 {
    DEFAULT_MAXIMUM_FAILURES
}

impl Config {
    /// Create a configuration for `engine` with default limits.
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            min_connections: 0,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            maximum_failures: DEFAULT_MAXIMUM_FAILURES,
            debug_queries: false,
            debug_results: false,
            compiler: CompilerKind::default(),
            backend: None,
            type_parsers: Vec::new(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn maximum_failures(mut self, max: u32) -> Self {
        self.maximum_failures = max;
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

    pub fn compiler(mut self, compiler: CompilerKind) -> Self {
        self.compiler = compiler;
        self
    }

    /// Supply a backend factory instead of the dialect default.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Add one type-parser entry.
    pub fn type_parser(mut self, spec: TypeParserSpec) -> Self {
        self.type_parsers.push(spec);
        self
    }
}

/// Validate an engine tag: `[a-z_][a-z0-9_]*`.
pub fn validate_engine_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let lead_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if lead_ok && rest_ok {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "invalid engine name `{name}`"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("pgsql");
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.maximum_failures, 20);
        assert_eq!(config.compiler, CompilerKind::Identity);
        assert!(!config.debug_queries);
        assert!(config.backend.is_none());
    }

    #[test]
    fn test_builder() {
        let config = Config::new("pgsql")
            .host("localhost")
            .port(5432)
            .username("app")
            .password("secret")
            .database("app_main")
            .max_connections(2)
            .maximum_failures(5)
            .debug_queries(true);

        assert_eq!(config.host.as_deref(), Some("localhost"));
        assert_eq!(config.port, Some(5432));
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.maximum_failures, 5);
        assert!(config.debug_queries);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"engine": "pgsql", "host": "db", "port": 5433}"#).unwrap();
        assert_eq!(config.engine, "pgsql");
        assert_eq!(config.host.as_deref(), Some("db"));
        assert_eq!(config.port, Some(5433));
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.compiler, CompilerKind::Identity);
    }

    #[test]
    fn test_deserialize_rejects_unknown_compiler() {
        let result =
            serde_json::from_str::<Config>(r#"{"engine": "pgsql", "compiler": "handwritten"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_compiler_kind_from_str() {
        assert_eq!("xql".parse::<CompilerKind>().unwrap(), CompilerKind::Xql);
        assert!("sql++".parse::<CompilerKind>().is_err());
    }

    #[test]
    fn test_engine_names() {
        assert!(validate_engine_name("pgsql").is_ok());
        assert!(validate_engine_name("my_sql2").is_ok());
        assert!(validate_engine_name("_private").is_ok());
        assert!(validate_engine_name("").is_err());
        assert!(validate_engine_name("9lives").is_err());
        assert!(validate_engine_name("PgSql").is_err());
        assert!(validate_engine_name("pg-sql").is_err());
    }
}
