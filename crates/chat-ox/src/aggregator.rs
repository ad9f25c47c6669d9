//! Reassembly of a chunked completion stream into callback notifications.
//!
//! The aggregator owns all per-stream state: the current message id, the text
//! buffer, the tool calls being assembled, and the flush scheduler. It is
//! driven by a single task (see [`crate::stream::drive_stream`]), so chunk
//! handling and timer ticks never overlap and no locking is needed.

use std::collections::BTreeMap;

use reqwest::header::HeaderMap;
use tokio::time::Instant;

use crate::{
    StreamCallbacks,
    batch::{BatchPolicy, FlushScheduler},
    error::{FailureSource, StreamFailure, normalize_failure},
    event::{StreamEvent, ToolCallFragment},
    response::{ChatCompletionChunk, FinishReason},
};

/// A tool call assembled from its fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallInfo {
    pub id: Option<String>,
    pub index: u32,
    pub name: Option<String>,
    /// Concatenation of every argument fragment, in arrival order
    pub arguments: String,
}

impl ToolCallInfo {
    fn new(index: u32) -> Self {
        Self {
            id: None,
            index,
            name: None,
            arguments: String::new(),
        }
    }

    /// Fold one fragment in. Non-empty `id`/`name` replace earlier values;
    /// argument chunks are always appended.
    fn apply(&mut self, fragment: ToolCallFragment) {
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            self.id = Some(id);
        }
        if let Some(name) = fragment.function_name.filter(|name| !name.is_empty()) {
            self.name = Some(name);
        }
        if let Some(chunk) = fragment.arguments_chunk {
            self.arguments.push_str(&chunk);
        }
    }
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The chunk sequence was exhausted and everything was flushed
    Done,
    /// A non-cancellation failure was reported through `on_error`
    Error(StreamFailure),
    /// The caller cancelled; neither `on_done` nor `on_error` fired
    Aborted,
}

/// Lifecycle of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Streaming,
    /// Final emission after the chunk sequence ended
    Flushing,
    /// Absorbing; no further input is processed
    Terminal(StreamOutcome),
}

/// State machine turning decoded events into batched notifications.
#[derive(Debug)]
pub struct StreamAggregator<C> {
    callbacks: C,
    state: AggregatorState,
    current_message_id: Option<String>,
    pending: String,
    pending_units: usize,
    tool_calls: BTreeMap<u32, ToolCallInfo>,
    headers: Option<HeaderMap>,
    headers_emitted: bool,
    scheduler: FlushScheduler,
}

impl<C: StreamCallbacks> StreamAggregator<C> {
    pub fn new(callbacks: C, policy: BatchPolicy) -> Self {
        Self {
            callbacks,
            state: AggregatorState::Idle,
            current_message_id: None,
            pending: String::new(),
            pending_units: 0,
            tool_calls: BTreeMap::new(),
            headers: None,
            headers_emitted: false,
            scheduler: FlushScheduler::new(policy),
        }
    }

    pub fn state(&self) -> &AggregatorState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, AggregatorState::Terminal(_))
    }

    pub fn policy(&self) -> BatchPolicy {
        self.scheduler.policy()
    }

    pub fn current_message_id(&self) -> Option<&str> {
        self.current_message_id.as_deref()
    }

    /// Text received but not yet delivered
    pub fn pending_content(&self) -> &str {
        &self.pending
    }

    /// Whether the batching ticker is running
    pub fn timer_running(&self) -> bool {
        self.scheduler.is_armed()
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn into_callbacks(self) -> C {
        self.callbacks
    }

    /// Remember the response headers; they are announced with the first chunk.
    pub fn capture_headers(&mut self, headers: HeaderMap) {
        if self.is_terminal() {
            return;
        }
        self.begin();
        self.headers = Some(headers);
    }

    /// Process one raw chunk. Headers are announced even when the chunk
    /// decodes to no event.
    pub fn handle_chunk(&mut self, chunk: &ChatCompletionChunk, now: Instant) {
        if self.is_terminal() {
            return;
        }
        self.begin();
        self.emit_headers();

        match StreamEvent::from_chunk(chunk) {
            Some(event) => self.process_event(event, now),
            None => log::trace!("skipping chunk without choices"),
        }
    }

    /// Process one decoded event.
    pub fn handle_event(&mut self, event: StreamEvent, now: Instant) {
        if self.is_terminal() {
            return;
        }
        self.begin();
        self.emit_headers();
        self.process_event(event, now);
    }

    /// Timer trigger: flush if the interval has passed since the last flush.
    pub fn on_tick(&mut self, now: Instant) {
        if self.state != AggregatorState::Streaming || self.pending.is_empty() {
            return;
        }
        if self.scheduler.interval_elapsed(now) {
            self.flush_content(now);
        }
    }

    /// Resolves on the next batching tick; pending forever while unarmed.
    pub async fn next_tick(&mut self) -> Instant {
        self.scheduler.tick().await
    }

    /// Normal end of the chunk sequence.
    pub fn finish(&mut self, now: Instant) -> StreamOutcome {
        if let AggregatorState::Terminal(outcome) = &self.state {
            return outcome.clone();
        }

        self.state = AggregatorState::Flushing;
        self.scheduler.stop();
        self.flush_content(now);
        self.flush_tool_calls();
        log::debug!("stream finished");
        self.callbacks.on_done();

        self.terminate(StreamOutcome::Done)
    }

    /// Report a failure through `on_error` and stop.
    pub fn fail(&mut self, error: &dyn FailureSource) -> StreamOutcome {
        if let AggregatorState::Terminal(outcome) = &self.state {
            return outcome.clone();
        }

        self.state = AggregatorState::Flushing;
        self.scheduler.stop();
        let failure = normalize_failure(error);
        log::warn!("stream failed: {failure}");
        self.callbacks.on_error(&failure);

        self.terminate(StreamOutcome::Error(failure))
    }

    /// Stop silently after a cancellation. Idempotent.
    pub fn abort(&mut self) -> StreamOutcome {
        if let AggregatorState::Terminal(outcome) = &self.state {
            return outcome.clone();
        }

        self.scheduler.stop();
        log::debug!("stream cancelled");

        self.terminate(StreamOutcome::Aborted)
    }

    fn begin(&mut self) {
        if self.state == AggregatorState::Idle {
            self.state = AggregatorState::Streaming;
        }
    }

    fn terminate(&mut self, outcome: StreamOutcome) -> StreamOutcome {
        self.pending.clear();
        self.pending_units = 0;
        self.tool_calls.clear();
        self.state = AggregatorState::Terminal(outcome.clone());
        outcome
    }

    fn emit_headers(&mut self) {
        if self.headers_emitted {
            return;
        }
        if let Some(headers) = self.headers.take() {
            self.headers_emitted = true;
            self.callbacks.on_headers(&headers);
        }
    }

    fn process_event(&mut self, event: StreamEvent, now: Instant) {
        let StreamEvent {
            message_id,
            content_delta,
            tool_call_deltas,
            finish_reason,
        } = event;

        if let Some(id) = message_id.filter(|id| !id.is_empty()) {
            self.enter_message(id, now);
        }

        if let Some(text) = content_delta.filter(|text| !text.is_empty()) {
            self.push_content(&text, now);
        }

        for fragment in tool_call_deltas {
            self.tool_calls
                .entry(fragment.index)
                .or_insert_with(|| ToolCallInfo::new(fragment.index))
                .apply(fragment);
        }

        if finish_reason == Some(FinishReason::ToolCalls) {
            // Text that preceded the calls must reach the sink first
            self.flush_content(now);
            self.flush_tool_calls();
        }
    }

    fn enter_message(&mut self, id: String, now: Instant) {
        if self.current_message_id.as_deref() == Some(id.as_str()) {
            return;
        }

        if self.current_message_id.is_some() {
            self.flush_content(now);
            self.flush_tool_calls();
        }

        log::debug!("new message {id}");
        self.scheduler.mark_emitted(now);
        self.callbacks.on_new_message(&id);
        self.current_message_id = Some(id);
    }

    fn push_content(&mut self, text: &str, now: Instant) {
        self.pending.push_str(text);
        self.pending_units += text.encode_utf16().count();
        self.scheduler.arm();

        if self.scheduler.size_reached(self.pending_units) {
            self.flush_content(now);
        }
    }

    fn flush_content(&mut self, now: Instant) {
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        self.pending_units = 0;
        self.callbacks
            .on_delta(&text, self.current_message_id.as_deref());
        self.scheduler.mark_emitted(now);
    }

    fn flush_tool_calls(&mut self) {
        for call in std::mem::take(&mut self.tool_calls).into_values() {
            if call.arguments.trim().is_empty() {
                log::debug!("dropping tool call {} with blank arguments", call.index);
                continue;
            }
            self.callbacks.on_tool_call(&call);
        }
    }
}
