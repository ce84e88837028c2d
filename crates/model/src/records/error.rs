use std::str::Utf8Error;
use thiserror::Error;

/// A record whose fields cannot be turned into statement parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("Record has {found} fields, statement expects {expected}")]
    Arity { expected: usize, found: usize },

    #[error("Field {index} contains a NUL byte, which text columns cannot store")]
    NulInText { index: usize },

    #[error("Field {index} is not valid UTF-8: {source}")]
    InvalidUtf8 {
        index: usize,
        #[source]
        source: Utf8Error,
    },
}
