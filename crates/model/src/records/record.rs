use crate::core::value::Value;
use serde::{Deserialize, Serialize};

/// One unit of upstream output, e.g. a single extracted credential.
///
/// Fields are positional; their meaning is given by the sink that receives
/// the record (column order for the database sink, column order on disk for
/// the file sink).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<Value>,
}

impl Record {
    pub fn new(fields: Vec<Value>) -> Self {
        Record { fields }
    }

    /// Splits one delimited input line into raw fields. Trailing `\r\n` or
    /// `\n` is stripped; the bytes are not decoded.
    pub fn from_line(line: &[u8], delimiter: u8) -> Self {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let fields = line
            .split(|b| *b == delimiter)
            .map(|field| Value::Raw(field.to_vec()))
            .collect();
        Record { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter()
    }
}

impl<V: Into<Value>> FromIterator<V> for Record {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_line_splits_raw_fields() {
        let record = Record::from_line(b"alice\ts3cret\r\n", b'\t');
        assert_eq!(
            record,
            Record::new(vec![
                Value::Raw(b"alice".to_vec()),
                Value::Raw(b"s3cret".to_vec())
            ])
        );
    }

    #[test]
    fn test_from_line_keeps_empty_fields() {
        let record = Record::from_line(b"bob::", b':');
        assert_eq!(record.len(), 3);
        assert_eq!(record.iter().last(), Some(&Value::Raw(Vec::new())));
    }

    #[test]
    fn test_collect_from_strs() {
        let record: Record = ["a", "1"].into_iter().collect();
        assert_eq!(record, Record::new(vec![Value::from("a"), Value::from("1")]));
    }
}
