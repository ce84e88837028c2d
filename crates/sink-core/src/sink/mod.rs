use crate::error::SinkError;
use async_trait::async_trait;
use model::records::record::Record;

pub mod console;
pub mod database;
pub mod dispatch;
pub mod file;
pub mod format;
pub mod log;

/// Sink-specific half of the dispatch contract.
///
/// Implementations never need their own locking: a [`dispatch::Dispatcher`]
/// owns the sink and serializes every call.
#[async_trait]
pub trait Sink: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Writes one record. `seq` is the 1-based dispatch sequence number of
    /// this record on its dispatcher.
    async fn write(&mut self, seq: u64, record: &Record) -> Result<(), SinkError>;

    /// Releases owned resources. Called at most once by the dispatcher.
    async fn finalize(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub type DynSink = Box<dyn Sink>;

#[async_trait]
impl Sink for DynSink {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn write(&mut self, seq: u64, record: &Record) -> Result<(), SinkError> {
        (**self).write(seq, record).await
    }

    async fn finalize(&mut self) -> Result<(), SinkError> {
        (**self).finalize().await
    }
}
