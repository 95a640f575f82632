//! SQL dialect tags.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Supported SQL dialects.
///
/// The dialect selects the adapter that knows how to build connection
/// URLs and configure type decoding, and parameterizes the `xql`
/// compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Pgsql,
}

impl Dialect {
    /// The engine tag this dialect registers under.
    pub fn tag(&self) -> &'static str {
        match self {
            Dialect::Pgsql => "pgsql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pgsql" => Ok(Dialect::Pgsql),
            other => Err(Error::configuration(format!("unknown dialect `{other}`"))),
        }
    }
}
