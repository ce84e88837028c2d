//! Fans input lines out to producer tasks that dispatch every record to
//! every sink.

use crate::error::CliError;
use futures_util::future::join_all;
use model::records::record::Record;
use sink_core::sink::{DynSink, dispatch::Dispatcher};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 1024;

pub type SharedSink = Arc<Dispatcher<DynSink>>;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub delimiter: u8,
    pub producers: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lines: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct ProducerSummary {
    dispatched: u64,
    failed: u64,
    detach_errors: Vec<String>,
}

/// Reads `input` until EOF or cancellation. Every producer is attached to
/// every sink before the first line is read and detaches once its channel
/// drains, so the last producer to finish finalizes each sink.
pub async fn run<R>(
    sinks: Vec<SharedSink>,
    mut input: R,
    options: RunOptions,
    cancel: CancellationToken,
) -> Result<RunSummary, CliError>
where
    R: AsyncBufRead + Unpin,
{
    let producers = options.producers.max(1);
    let sinks = Arc::new(sinks);

    for _ in 0..producers {
        for sink in sinks.iter() {
            sink.attach();
        }
    }

    let mut senders = Vec::with_capacity(producers);
    let mut handles: Vec<JoinHandle<ProducerSummary>> = Vec::with_capacity(producers);
    for id in 0..producers {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
        senders.push(tx);
        handles.push(tokio::spawn(produce(
            id,
            rx,
            Arc::clone(&sinks),
            options.delimiter,
        )));
    }
    info!(producers, sinks = sinks.len(), "Dispatch started");

    let mut summary = RunSummary::default();
    let mut line = Vec::new();
    let mut next = 0usize;
    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Input cancelled, finishing queued records");
                summary.cancelled = true;
                break;
            }
            read = input.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                error!(error = %err, "Failed to read input");
                break;
            }
        }

        if line.iter().all(|b| matches!(b, b'\n' | b'\r')) {
            continue;
        }
        summary.lines += 1;

        if senders[next].send(std::mem::take(&mut line)).await.is_err() {
            error!(producer = next, "Producer stopped early");
            break;
        }
        next = (next + 1) % producers;
    }

    drop(senders);
    let mut detach_errors = Vec::new();
    for handle in handles {
        let producer = handle
            .await
            .map_err(|err| CliError::Unexpected(format!("producer task failed: {err}")))?;
        summary.dispatched += producer.dispatched;
        summary.failed += producer.failed;
        detach_errors.extend(producer.detach_errors);
    }

    info!(
        lines = summary.lines,
        dispatched = summary.dispatched,
        failed = summary.failed,
        "Dispatch finished"
    );

    if !detach_errors.is_empty() {
        return Err(CliError::Unexpected(detach_errors.join("; ")));
    }
    Ok(summary)
}

async fn produce(
    id: usize,
    mut rx: mpsc::Receiver<Vec<u8>>,
    sinks: Arc<Vec<SharedSink>>,
    delimiter: u8,
) -> ProducerSummary {
    let mut summary = ProducerSummary::default();

    while let Some(line) = rx.recv().await {
        let record = Record::from_line(&line, delimiter);
        let results = join_all(sinks.iter().map(|sink| sink.handle(&record))).await;
        for (sink, result) in sinks.iter().zip(results) {
            match result {
                Ok(()) => summary.dispatched += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(producer = id, sink = sink.name(), error = %err, "Dispatch failed");
                }
            }
        }
    }

    for sink in sinks.iter() {
        if let Err(err) = sink.detach().await {
            error!(producer = id, sink = sink.name(), error = %err, "Detach failed");
            summary.detach_errors.push(err.to_string());
        }
    }
    debug!(producer = id, dispatched = summary.dispatched, "Producer finished");
    summary
}
