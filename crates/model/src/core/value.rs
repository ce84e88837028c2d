use crate::core::utils::encode_bytea;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field of a record as handed over by an upstream producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    String(String),
    /// Text exactly as it was extracted, not yet decoded. It is decoded as
    /// UTF-8 when bound to a statement parameter.
    Raw(Vec<u8>),
    Bytes(Vec<u8>),
    Null,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Plain rendering used by the formatting sinks: strings are printed as-is,
/// raw text is decoded lossily and binary data is shown as a bytea literal.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Raw(v) => f.write_str(&String::from_utf8_lossy(v)),
            Value::Bytes(v) => f.write_str(&encode_bytea(v)),
            Value::Null => f.write_str("NULL"),
        }
    }
}
