//! Single-task driver connecting the transport to the aggregator.

use std::future::Future;

use chat_ox_common::{CancellationToken, SseStream};
use futures_util::StreamExt;
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    ChatRequestError, StreamCallbacks,
    aggregator::{StreamAggregator, StreamOutcome},
    batch::BatchPolicy,
    response::ChatCompletionChunk,
};

/// Result of opening a completion stream
pub type OpenedStream = Result<SseStream<ChatCompletionChunk>, ChatRequestError>;

/// Run one stream to completion.
///
/// `open` establishes the connection; everything after that (chunks, batching
/// ticks, cancellation) is multiplexed on the calling task, so callbacks are
/// never invoked concurrently. Cancellation is checked first on every wake-up
/// and ends the stream without `on_done` or `on_error`.
pub async fn drive_stream<F, C>(
    open: F,
    callbacks: C,
    policy: BatchPolicy,
    cancel: CancellationToken,
) -> StreamOutcome
where
    F: Future<Output = OpenedStream>,
    C: StreamCallbacks,
{
    let mut aggregator = StreamAggregator::new(callbacks, policy);

    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return aggregator.abort(),
        opened = open => opened,
    };

    let SseStream {
        headers,
        mut events,
    } = match opened {
        Ok(stream) => stream,
        Err(err) if err.is_cancelled() => return aggregator.abort(),
        Err(err) => return aggregator.fail(&err),
    };
    aggregator.capture_headers(headers);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return aggregator.abort(),
            now = aggregator.next_tick() => aggregator.on_tick(now),
            next = events.next() => match next {
                Some(Ok(chunk)) => aggregator.handle_chunk(&chunk, Instant::now()),
                Some(Err(err)) if err.is_cancelled() => return aggregator.abort(),
                Some(Err(err)) => return aggregator.fail(&err),
                None => return aggregator.finish(Instant::now()),
            },
        }
    }
}

/// Handle to a stream running on its own task.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    /// Spawn `drive_stream` with the given token.
    pub fn spawn<F, C>(open: F, callbacks: C, policy: BatchPolicy, cancel: CancellationToken) -> Self
    where
        F: Future<Output = OpenedStream> + Send + 'static,
        C: StreamCallbacks + Send + 'static,
    {
        let task = tokio::spawn(drive_stream(open, callbacks, policy, cancel.clone()));
        Self { cancel, task }
    }

    /// Request cancellation. Safe to call any number of times, at any point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the stream to settle.
    ///
    /// A task torn down by the runtime counts as aborted; a panicking sink
    /// re-raises its panic here.
    pub async fn wait(self) -> StreamOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => StreamOutcome::Aborted,
        }
    }
}
