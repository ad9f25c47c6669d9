//! Decoding of wire chunks into aggregator events.

use crate::response::{ChatCompletionChunk, FinishReason};

/// One decoded unit of server output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamEvent {
    /// Logical message this event belongs to
    pub message_id: Option<String>,
    /// Additional assistant-visible text
    pub content_delta: Option<String>,
    /// Partial tool-call updates, in wire order
    pub tool_call_deltas: Vec<ToolCallFragment>,
    pub finish_reason: Option<FinishReason>,
}

/// A partial update to the tool call at `index` of the current message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub function_name: Option<String>,
    /// Appended verbatim to the call's arguments
    pub arguments_chunk: Option<String>,
}

impl StreamEvent {
    /// Decode a chunk, or `None` when it carries no choice.
    ///
    /// Empty strings are treated as absent. Tool-call fragments without an
    /// index cannot be attributed to a call and are skipped.
    pub fn from_chunk(chunk: &ChatCompletionChunk) -> Option<Self> {
        let choice = chunk.first_choice()?;

        let tool_call_deltas = choice
            .delta
            .tool_calls
            .iter()
            .flatten()
            .filter_map(|call| {
                let index = call.index?;
                let function = call.function.as_ref();
                Some(ToolCallFragment {
                    index,
                    id: non_empty(call.id.as_deref()),
                    function_name: non_empty(function.and_then(|f| f.name.as_deref())),
                    arguments_chunk: non_empty(function.and_then(|f| f.arguments.as_deref())),
                })
            })
            .collect();

        Some(Self {
            message_id: non_empty(chunk.id.as_deref()),
            content_delta: non_empty(choice.delta.content.as_deref()),
            tool_call_deltas,
            finish_reason: choice.finish_reason,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
