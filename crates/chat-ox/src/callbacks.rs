//! Notification surface of a streamed completion.

use reqwest::header::HeaderMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::{StreamFailure, ToolCallInfo};

/// Receiver of aggregator notifications.
///
/// Every method defaults to doing nothing, so a sink only implements what it
/// cares about. Within one stream:
/// - `on_headers` fires at most once, before any content or tool call;
/// - `on_new_message` fires once per distinct message id, including the first;
/// - the `on_delta` texts for one message id concatenate to its full text;
/// - exactly one of `on_done` / `on_error` fires, unless the stream is cancelled,
///   in which case neither does.
pub trait StreamCallbacks {
    fn on_headers(&mut self, _headers: &HeaderMap) {}

    fn on_new_message(&mut self, _message_id: &str) {}

    fn on_delta(&mut self, _text: &str, _message_id: Option<&str>) {}

    fn on_tool_call(&mut self, _tool_call: &ToolCallInfo) {}

    fn on_done(&mut self) {}

    fn on_error(&mut self, _error: &StreamFailure) {}
}

impl<C: StreamCallbacks + ?Sized> StreamCallbacks for &mut C {
    fn on_headers(&mut self, headers: &HeaderMap) {
        (**self).on_headers(headers);
    }

    fn on_new_message(&mut self, message_id: &str) {
        (**self).on_new_message(message_id);
    }

    fn on_delta(&mut self, text: &str, message_id: Option<&str>) {
        (**self).on_delta(text, message_id);
    }

    fn on_tool_call(&mut self, tool_call: &ToolCallInfo) {
        (**self).on_tool_call(tool_call);
    }

    fn on_done(&mut self) {
        (**self).on_done();
    }

    fn on_error(&mut self, error: &StreamFailure) {
        (**self).on_error(error);
    }
}

impl<C: StreamCallbacks + ?Sized> StreamCallbacks for Box<C> {
    fn on_headers(&mut self, headers: &HeaderMap) {
        (**self).on_headers(headers);
    }

    fn on_new_message(&mut self, message_id: &str) {
        (**self).on_new_message(message_id);
    }

    fn on_delta(&mut self, text: &str, message_id: Option<&str>) {
        (**self).on_delta(text, message_id);
    }

    fn on_tool_call(&mut self, tool_call: &ToolCallInfo) {
        (**self).on_tool_call(tool_call);
    }

    fn on_done(&mut self) {
        (**self).on_done();
    }

    fn on_error(&mut self, error: &StreamFailure) {
        (**self).on_error(error);
    }
}

/// Owned copy of a single callback invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotification {
    Headers(HeaderMap),
    NewMessage(String),
    Delta {
        text: String,
        message_id: Option<String>,
    },
    ToolCall(ToolCallInfo),
    Done,
    Error(StreamFailure),
}

impl StreamNotification {
    /// Replay this notification onto `callbacks`.
    pub fn deliver<C: StreamCallbacks + ?Sized>(&self, callbacks: &mut C) {
        match self {
            Self::Headers(headers) => callbacks.on_headers(headers),
            Self::NewMessage(id) => callbacks.on_new_message(id),
            Self::Delta { text, message_id } => callbacks.on_delta(text, message_id.as_deref()),
            Self::ToolCall(tool_call) => callbacks.on_tool_call(tool_call),
            Self::Done => callbacks.on_done(),
            Self::Error(failure) => callbacks.on_error(failure),
        }
    }
}

/// Records every notification in order.
impl StreamCallbacks for Vec<StreamNotification> {
    fn on_headers(&mut self, headers: &HeaderMap) {
        self.push(StreamNotification::Headers(headers.clone()));
    }

    fn on_new_message(&mut self, message_id: &str) {
        self.push(StreamNotification::NewMessage(message_id.to_string()));
    }

    fn on_delta(&mut self, text: &str, message_id: Option<&str>) {
        self.push(StreamNotification::Delta {
            text: text.to_string(),
            message_id: message_id.map(str::to_string),
        });
    }

    fn on_tool_call(&mut self, tool_call: &ToolCallInfo) {
        self.push(StreamNotification::ToolCall(tool_call.clone()));
    }

    fn on_done(&mut self) {
        self.push(StreamNotification::Done);
    }

    fn on_error(&mut self, error: &StreamFailure) {
        self.push(StreamNotification::Error(error.clone()));
    }
}

/// Forwards notifications out of a spawned stream. A dropped receiver is ignored.
impl StreamCallbacks for UnboundedSender<StreamNotification> {
    fn on_headers(&mut self, headers: &HeaderMap) {
        let _ = self.send(StreamNotification::Headers(headers.clone()));
    }

    fn on_new_message(&mut self, message_id: &str) {
        let _ = self.send(StreamNotification::NewMessage(message_id.to_string()));
    }

    fn on_delta(&mut self, text: &str, message_id: Option<&str>) {
        let _ = self.send(StreamNotification::Delta {
            text: text.to_string(),
            message_id: message_id.map(str::to_string),
        });
    }

    fn on_tool_call(&mut self, tool_call: &ToolCallInfo) {
        let _ = self.send(StreamNotification::ToolCall(tool_call.clone()));
    }

    fn on_done(&mut self) {
        let _ = self.send(StreamNotification::Done);
    }

    fn on_error(&mut self, error: &StreamFailure) {
        let _ = self.send(StreamNotification::Error(error.clone()));
    }
}
