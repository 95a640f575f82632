//! Well-known PostgreSQL type OIDs and parser-spec normalization.
//!
//! PostgreSQL identifies types by numeric OIDs. Configured parsers may
//! name a type symbolically; resolution to an OID happens here, while
//! the configuration is normalized, so a typo fails setup instead of a
//! query.

use turnstile_core::backend::{ParserFormat, TypeParser, TypeParserSpec, TypeRef};
use turnstile_core::error::{Error, Result};

/// Boolean
pub const BOOL: u32 = 16;
/// Byte array (bytea)
pub const BYTEA: u32 = 17;
/// Single character
pub const CHAR: u32 = 18;
/// Internal 63-byte identifier
pub const NAME: u32 = 19;
/// 8-byte signed integer (bigint)
pub const INT8: u32 = 20;
/// 2-byte signed integer (smallint)
pub const INT2: u32 = 21;
/// 4-byte signed integer
pub const INT4: u32 = 23;
/// Variable-length text
pub const TEXT: u32 = 25;
/// Object identifier
pub const OID: u32 = 26;
/// JSON (text form)
pub const JSON: u32 = 114;
/// XML data
pub const XML: u32 = 142;
/// Single-precision float (real)
pub const FLOAT4: u32 = 700;
/// Double-precision float
pub const FLOAT8: u32 = 701;
/// Money
pub const MONEY: u32 = 790;
/// MAC address
pub const MACADDR: u32 = 829;
/// IPv4/IPv6 network
pub const CIDR: u32 = 650;
/// IPv4/IPv6 host address
pub const INET: u32 = 869;
/// Fixed-length character (bpchar)
pub const BPCHAR: u32 = 1042;
/// Variable-length character with limit
pub const VARCHAR: u32 = 1043;
/// Date
pub const DATE: u32 = 1082;
/// Time without time zone
pub const TIME: u32 = 1083;
/// Timestamp without time zone
pub const TIMESTAMP: u32 = 1114;
/// Timestamp with time zone
pub const TIMESTAMPTZ: u32 = 1184;
/// Arbitrary-precision numeric
pub const NUMERIC: u32 = 1700;
/// UUID
pub const UUID: u32 = 2950;
/// JSON (binary form)
pub const JSONB: u32 = 3802;

/// Resolve a well-known type name to its OID. Case-insensitive.
pub fn oid_of(name: &str) -> Option<u32> {
    let oid = match name.to_ascii_uppercase().as_str() {
        "BOOL" => BOOL,
        "BYTEA" => BYTEA,
        "CHAR" => CHAR,
        "NAME" => NAME,
        "INT8" => INT8,
        "INT2" => INT2,
        "INT4" => INT4,
        "TEXT" => TEXT,
        "OID" => OID,
        "JSON" => JSON,
        "XML" => XML,
        "FLOAT4" => FLOAT4,
        "FLOAT8" => FLOAT8,
        "MONEY" => MONEY,
        "MACADDR" => MACADDR,
        "CIDR" => CIDR,
        "INET" => INET,
        "BPCHAR" => BPCHAR,
        "VARCHAR" => VARCHAR,
        "DATE" => DATE,
        "TIME" => TIME,
        "TIMESTAMP" => TIMESTAMP,
        "TIMESTAMPTZ" => TIMESTAMPTZ,
        "NUMERIC" => NUMERIC,
        "UUID" => UUID,
        "JSONB" => JSONB,
        _ => return None,
    };
    Some(oid)
}

/// A parser entry with its type resolved to a numeric OID.
#[derive(Clone)]
pub struct TypeParserEntry {
    pub oid: u32,
    pub format: ParserFormat,
    pub parser: TypeParser,
}

impl std::fmt::Debug for TypeParserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeParserEntry")
            .field("oid", &self.oid)
            .field("format", &self.format)
            .finish()
    }
}

/// Resolve every configured parser spec to a numeric OID.
pub fn normalize(specs: &[TypeParserSpec]) -> Result<Vec<TypeParserEntry>> {
    specs
        .iter()
        .map(|spec| {
            let oid = match &spec.type_ref {
                TypeRef::Oid(oid) => *oid,
                TypeRef::Name(name) => oid_of(name).ok_or_else(|| {
                    Error::configuration(format!("unknown type name `{name}`"))
                })?,
            };
            Ok(TypeParserEntry {
                oid,
                format: spec.format,
                parser: spec.parser.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use turnstile_core::backend::Value;

    use super::*;

    fn parser() -> TypeParser {
        Arc::new(|_raw| Value::Null)
    }

    #[test]
    fn test_well_known_names() {
        assert_eq!(oid_of("INT4"), Some(23));
        assert_eq!(oid_of("JSONB"), Some(3802));
        assert_eq!(oid_of("jsonb"), Some(3802));
        assert_eq!(oid_of("TIMESTAMPTZ"), Some(1184));
        assert_eq!(oid_of("POINT"), None);
    }

    #[test]
    fn test_normalize_resolves_names() {
        let specs = vec![
            TypeParserSpec::named("JSONB", ParserFormat::Text, parser()),
            TypeParserSpec::by_oid(600, ParserFormat::Binary, parser()),
        ];
        let entries = normalize(&specs).unwrap();
        assert_eq!(entries[0].oid, 3802);
        assert_eq!(entries[0].format, ParserFormat::Text);
        assert_eq!(entries[1].oid, 600);
    }

    #[test]
    fn test_normalize_rejects_unknown_names() {
        let specs = vec![TypeParserSpec::named("FANCY", ParserFormat::Text, parser())];
        let err = normalize(&specs).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("FANCY"));
    }
}
