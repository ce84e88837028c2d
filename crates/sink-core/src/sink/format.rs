//! Line formatting shared by the console and log sinks.

use model::{core::value::Value, records::record::Record};
use std::{fmt, sync::Arc};

/// Joins already-formatted fields into the body of a line.
pub type RecordFormatter = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

/// Renders a single field.
pub type FieldFormatter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

pub const DEFAULT_SEPARATOR: &str = ", ";

/// Builds `[scope seq] field1, field2` style lines.
///
/// The bracketed header is only emitted when a scope label is set or the
/// sequence number is requested.
#[derive(Clone)]
pub struct LineFormatter {
    scope: Option<String>,
    show_count: bool,
    record_formatter: RecordFormatter,
    field_formatter: FieldFormatter,
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFormatter {
    pub fn new() -> Self {
        Self {
            scope: None,
            show_count: false,
            record_formatter: joined(DEFAULT_SEPARATOR),
            field_formatter: Arc::new(|value: &Value| value.to_string()),
        }
    }

    pub fn with_scope(mut self, scope: Option<impl Into<String>>) -> Self {
        self.scope = scope.map(Into::into);
        self
    }

    pub fn with_count(mut self, show_count: bool) -> Self {
        self.show_count = show_count;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.record_formatter = joined(separator);
        self
    }

    pub fn with_record_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        self.record_formatter = Arc::new(formatter);
        self
    }

    pub fn with_field_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.field_formatter = Arc::new(formatter);
        self
    }

    pub fn format(&self, seq: u64, record: &Record) -> String {
        let fields = record
            .iter()
            .map(|value| (self.field_formatter)(value))
            .collect::<Vec<_>>();

        let mut line = String::new();
        if self.show_count || self.scope.is_some() {
            let mut header = Vec::with_capacity(2);
            if let Some(scope) = &self.scope {
                header.push(scope.clone());
            }
            if self.show_count {
                header.push(seq.to_string());
            }
            line.push('[');
            line.push_str(&header.join(" "));
            line.push_str("] ");
        }

        line.push_str(&(self.record_formatter)(&fields));
        line
    }
}

impl fmt::Debug for LineFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineFormatter")
            .field("scope", &self.scope)
            .field("show_count", &self.show_count)
            .finish_non_exhaustive()
    }
}

fn joined(separator: impl Into<String>) -> RecordFormatter {
    let separator = separator.into();
    Arc::new(move |fields: &[String]| fields.join(&separator))
}
