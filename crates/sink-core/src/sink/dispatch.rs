//! Thread-safe dispatch and reference-counted lifecycle shared by all sinks.

use crate::{error::SinkError, sink::Sink};
use model::records::record::Record;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

/// A lock shared by several dispatchers whose sinks write to the same
/// process-global target.
pub type SharedLock = Arc<Mutex<()>>;

struct Inner<S> {
    sink: S,
    dispatched: u64,
    closed: bool,
}

/// Owns a sink and serializes all access to it.
///
/// Every producer calls [`attach`](Self::attach) before its first record
/// and [`detach`](Self::detach) after its last; the detach that brings the
/// count to zero finalizes the sink. Records handed in after that are
/// rejected with [`SinkError::Closed`].
pub struct Dispatcher<S: Sink> {
    name: String,
    inner: Mutex<Inner<S>>,
    shared: Option<SharedLock>,
    attached: AtomicUsize,
}

impl<S: Sink> Dispatcher<S> {
    /// Wraps `sink` behind a private lock.
    pub fn new(sink: S) -> Self {
        Self::build(sink, None)
    }

    /// Wraps `sink` so that it also serializes with every other dispatcher
    /// holding a clone of `lock`.
    pub fn with_shared_lock(sink: S, lock: SharedLock) -> Self {
        Self::build(sink, Some(lock))
    }

    fn build(sink: S, shared: Option<SharedLock>) -> Self {
        Self {
            name: sink.name().to_string(),
            inner: Mutex::new(Inner {
                sink,
                dispatched: 0,
                closed: false,
            }),
            shared,
            attached: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a producer and returns the new producer count.
    pub fn attach(&self) -> usize {
        let count = self.attached.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(sink = %self.name, attached = count, "Producer attached");
        count
    }

    /// Unregisters a producer and returns the remaining producer count.
    /// The last detach finalizes the sink before returning.
    pub async fn detach(&self) -> Result<usize, SinkError> {
        let previous = self
            .attached
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        match previous {
            Err(_) => {
                error!(sink = %self.name, "Detach without a matching attach");
                Err(SinkError::NotAttached(self.name.clone()))
            }
            Ok(1) => {
                debug!(sink = %self.name, "Last producer detached");
                self.finalize().await?;
                Ok(0)
            }
            Ok(n) => {
                debug!(sink = %self.name, attached = n - 1, "Producer detached");
                Ok(n - 1)
            }
        }
    }

    pub fn attached_count(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    /// Writes one record while holding the sink's lock for the whole write.
    pub async fn handle(&self, record: &Record) -> Result<(), SinkError> {
        let _shared = self.lock_shared().await;
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(SinkError::Closed(self.name.clone()));
        }

        inner.dispatched += 1;
        let seq = inner.dispatched;
        inner.sink.write(seq, record).await
    }

    /// Runs the sink's finalizer unless it already ran. Normally reached
    /// through the last [`detach`](Self::detach).
    pub async fn finalize(&self) -> Result<(), SinkError> {
        let _shared = self.lock_shared().await;
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }

        inner.closed = true;
        info!(sink = %self.name, dispatched = inner.dispatched, "Finalizing sink");
        inner.sink.finalize().await
    }

    pub async fn dispatch_count(&self) -> u64 {
        self.inner.lock().await.dispatched
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    /// Runs `f` against the wrapped sink under the dispatcher's lock.
    pub async fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let inner = self.inner.lock().await;
        f(&inner.sink)
    }

    async fn lock_shared(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.shared {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Records what it was asked to do.
    #[derive(Clone, Default)]
    struct Counters {
        writes: Arc<StdMutex<Vec<(u64, Record)>>>,
        finalized: Arc<AtomicUsize>,
    }

    struct CountingSink(Counters);

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &str {
            "counters"
        }

        async fn write(&mut self, seq: u64, record: &Record) -> Result<(), SinkError> {
            self.0.writes.lock().unwrap().push((seq, record.clone()));
            Ok(())
        }

        async fn finalize(&mut self) -> Result<(), SinkError> {
            self.0.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting_dispatcher() -> (Dispatcher<CountingSink>, Counters) {
        let counters = Counters::default();
        (Dispatcher::new(CountingSink(counters.clone())), counters)
    }

    fn record(user: &str) -> Record {
        [user, "pw"].into_iter().collect()
    }

    #[tokio::test]
    async fn test_attach_twice_detach_once_stays_open() {
        let (dispatcher, counters) = counting_dispatcher();
        dispatcher.attach();
        dispatcher.attach();
        assert_eq!(dispatcher.detach().await.unwrap(), 1);

        assert_eq!(dispatcher.attached_count(), 1);
        assert!(!dispatcher.is_closed().await);
        assert_eq!(counters.finalized.load(Ordering::SeqCst), 0);
        dispatcher.handle(&record("a")).await.unwrap();

        assert_eq!(dispatcher.detach().await.unwrap(), 0);
        assert!(dispatcher.is_closed().await);
        assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extra_detach_is_rejected_and_never_refinalizes() {
        let (dispatcher, counters) = counting_dispatcher();
        dispatcher.attach();
        dispatcher.detach().await.unwrap();

        let err = dispatcher.detach().await.unwrap_err();
        assert!(matches!(err, SinkError::NotAttached(name) if name == "counters"));
        assert_eq!(dispatcher.attached_count(), 0);
        assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detach_without_attach() {
        let (dispatcher, counters) = counting_dispatcher();
        assert!(dispatcher.detach().await.is_err());
        assert_eq!(counters.finalized.load(Ordering::SeqCst), 0);
        assert!(!dispatcher.is_closed().await);
    }

    #[tokio::test]
    async fn test_reattach_after_close_does_not_refinalize() {
        let (dispatcher, counters) = counting_dispatcher();
        dispatcher.attach();
        dispatcher.detach().await.unwrap();
        dispatcher.attach();
        dispatcher.detach().await.unwrap();
        assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_after_close_is_rejected() {
        let (dispatcher, counters) = counting_dispatcher();
        dispatcher.attach();
        dispatcher.handle(&record("a")).await.unwrap();
        dispatcher.detach().await.unwrap();

        let err = dispatcher.handle(&record("b")).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed(_)));
        assert_eq!(counters.writes.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.dispatch_count().await, 1);
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_dense() {
        let (dispatcher, counters) = counting_dispatcher();
        for user in ["a", "b", "c"] {
            dispatcher.handle(&record(user)).await.unwrap();
        }
        let seqs: Vec<u64> = counters.writes.lock().unwrap().iter().map(|(s, _)| *s).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_detach_finalizes_once() {
        let (dispatcher, counters) = counting_dispatcher();
        let dispatcher = Arc::new(dispatcher);
        for _ in 0..16 {
            dispatcher.attach();
        }

        let mut tasks = Vec::new();
        for i in 0..16 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move {
                dispatcher.handle(&record(&format!("u{i}"))).await.unwrap();
                dispatcher.detach().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
        assert_eq!(counters.writes.lock().unwrap().len(), 16);
        assert_eq!(dispatcher.dispatch_count().await, 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_lock_serializes_across_dispatchers() {
        // Both sinks append to one log; the shared lock makes each
        // write-pair atomic with respect to the other dispatcher.
        #[derive(Clone)]
        struct Interleave {
            log: Arc<StdMutex<Vec<&'static str>>>,
            tag: &'static str,
        }

        #[async_trait]
        impl Sink for Interleave {
            fn name(&self) -> &str {
                self.tag
            }

            async fn write(&mut self, _seq: u64, _record: &Record) -> Result<(), SinkError> {
                self.log.lock().unwrap().push(self.tag);
                tokio::task::yield_now().await;
                self.log.lock().unwrap().push(self.tag);
                Ok(())
            }
        }

        let log = Arc::new(StdMutex::new(Vec::new()));
        let lock: SharedLock = Arc::new(Mutex::new(()));
        let a = Arc::new(Dispatcher::with_shared_lock(
            Interleave { log: Arc::clone(&log), tag: "a" },
            Arc::clone(&lock),
        ));
        let b = Arc::new(Dispatcher::with_shared_lock(
            Interleave { log: Arc::clone(&log), tag: "b" },
            Arc::clone(&lock),
        ));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let target = if i % 2 == 0 { Arc::clone(&a) } else { Arc::clone(&b) };
            tasks.push(tokio::spawn(async move {
                target.handle(&Record::default()).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 40);
        for pair in log.chunks(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }
}
