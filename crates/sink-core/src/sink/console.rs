use crate::{
    error::SinkError,
    sink::{Sink, dispatch::SharedLock, format::LineFormatter},
};
use async_trait::async_trait;
use lazy_static::lazy_static;
use model::records::record::Record;
use std::{
    io::{self, Write},
    sync::Arc,
};
use tokio::sync::Mutex;

lazy_static! {
    static ref CONSOLE_LOCK: SharedLock = Arc::new(Mutex::new(()));
}

/// Process-wide lock for everything that prints to standard output.
pub struct ConsoleLock;

impl ConsoleLock {
    /// The lock every console sink built from configuration shares, so that
    /// lines from different sinks never interleave.
    pub fn global() -> SharedLock {
        Arc::clone(&CONSOLE_LOCK)
    }
}

/// Prints one formatted line per record.
pub struct ConsoleSink {
    name: String,
    formatter: LineFormatter,
    out: Box<dyn Write + Send>,
}

impl ConsoleSink {
    pub fn stdout(name: impl Into<String>, formatter: LineFormatter) -> Self {
        Self::with_writer(name, formatter, io::stdout())
    }

    pub fn with_writer(
        name: impl Into<String>,
        formatter: LineFormatter,
        out: impl Write + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            formatter,
            out: Box::new(out),
        }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, seq: u64, record: &Record) -> Result<(), SinkError> {
        let line = self.formatter.format(seq, record);
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::dispatch::Dispatcher;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Default)]
    struct Buffer(Arc<StdMutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_prints_counted_lines() {
        let buffer = Buffer::default();
        let formatter = LineFormatter::new().with_scope(Some("ssh")).with_count(true);
        let sink = ConsoleSink::with_writer("console", formatter, buffer.clone());
        let dispatcher = Dispatcher::new(sink);

        dispatcher.attach();
        for pair in [["root", "toor"], ["admin", "admin"]] {
            dispatcher.handle(&pair.into_iter().collect::<Record>()).await.unwrap();
        }
        dispatcher.detach().await.unwrap();

        assert_eq!(buffer.text(), "[ssh 1] root, toor\n[ssh 2] admin, admin\n");
    }

    #[tokio::test]
    async fn test_global_lock_is_shared() {
        assert!(Arc::ptr_eq(&ConsoleLock::global(), &ConsoleLock::global()));
    }
}
