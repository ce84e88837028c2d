use crate::{
    error::SinkError,
    sink::{Sink, format::LineFormatter},
};
use async_trait::async_trait;
use model::records::record::Record;
use serde::Deserialize;
use tracing::{Level, event};

pub const DEFAULT_LOG_SCOPE: &str = "Debug";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

/// Emits one tracing event per record.
pub struct LogSink {
    name: String,
    formatter: LineFormatter,
    level: LogLevel,
}

impl LogSink {
    pub fn new(name: impl Into<String>, formatter: LineFormatter, level: LogLevel) -> Self {
        Self {
            name: name.into(),
            formatter,
            level,
        }
    }
}

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, seq: u64, record: &Record) -> Result<(), SinkError> {
        let line = self.formatter.format(seq, record);
        // `event!` needs the level as a constant
        match self.level {
            LogLevel::Trace => event!(Level::TRACE, sink = %self.name, "{line}"),
            LogLevel::Debug => event!(Level::DEBUG, sink = %self.name, "{line}"),
            LogLevel::Info => event!(Level::INFO, sink = %self.name, "{line}"),
            LogLevel::Warn => event!(Level::WARN, sink = %self.name, "{line}"),
            LogLevel::Error => event!(Level::ERROR, sink = %self.name, "{line}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_emits_formatted_record() {
        let formatter = LineFormatter::new()
            .with_scope(Some(DEFAULT_LOG_SCOPE))
            .with_count(true);
        let mut sink = LogSink::new("log", formatter, LogLevel::Info);
        let record: Record = ["bob", "s3cret"].into_iter().collect();
        sink.write(7, &record).await.unwrap();

        assert!(logs_contain("[Debug 7] bob, s3cret"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_trace_level_is_emitted() {
        let mut sink = LogSink::new("log", LineFormatter::new(), LogLevel::Trace);
        let record: Record = ["quiet", "x"].into_iter().collect();
        sink.write(1, &record).await.unwrap();
        assert!(logs_contain("quiet, x"));
    }

    #[test]
    fn test_level_names() {
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(LogLevel::default(), LogLevel::Debug);
    }
}
