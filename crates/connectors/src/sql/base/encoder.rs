use model::{
    core::value::Value,
    records::{error::RecordError, record::Record},
};

/// Turns a record into the parameter tuple bound to a prepared insert.
pub trait ParamEncoder: Send + Sync {
    fn encode(&self, record: &Record, arity: usize) -> Result<Vec<Value>, RecordError>;
}

/// Encoder for text-oriented SQL backends.
///
/// Raw fields are decoded as UTF-8 and every textual value is checked for
/// NUL bytes, which text columns reject. Other values pass through as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParamEncoder;

impl ParamEncoder for TextParamEncoder {
    fn encode(&self, record: &Record, arity: usize) -> Result<Vec<Value>, RecordError> {
        if record.len() != arity {
            return Err(RecordError::Arity {
                expected: arity,
                found: record.len(),
            });
        }

        record
            .iter()
            .enumerate()
            .map(|(index, value)| match value {
                Value::Raw(bytes) => {
                    let text = std::str::from_utf8(bytes)
                        .map_err(|source| RecordError::InvalidUtf8 { index, source })?;
                    check_text(index, text)?;
                    Ok(Value::String(text.to_string()))
                }
                Value::String(text) => {
                    check_text(index, text)?;
                    Ok(value.clone())
                }
                other => Ok(other.clone()),
            })
            .collect()
    }
}

fn check_text(index: usize, text: &str) -> Result<(), RecordError> {
    if text.contains('\0') {
        return Err(RecordError::NulInText { index });
    }
    Ok(())
}
