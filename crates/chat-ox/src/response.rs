use serde::{Deserialize, Deserializer, Serialize};

/// One `chat.completion.chunk` frame of a streamed response.
///
/// Every field is optional on the wire; servers interleave metadata-only and
/// heartbeat frames with content frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Identifier of the logical message this chunk belongs to
    #[serde(default)]
    pub id: Option<String>,

    /// Object type (usually "chat.completion.chunk")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Unix timestamp of creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,

    /// Model that produced the chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Streaming choice deltas
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChunkChoice>,
}

/// Streaming choice delta
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Index of this choice
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,

    /// The partial message delta
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: MessageDelta,

    /// Reason for stopping
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Partial message for streaming
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Message role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Partial content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Partial tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A fragment of one tool call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call within its message
    #[serde(default)]
    pub index: Option<u32>,

    /// Call identifier, usually only on the first fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The type of tool call (usually "function")
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Function name and argument fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

/// Function details of a tool-call fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Next slice of the JSON argument string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Why the model stopped producing the current message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the message
    Stop,
    /// The model wants the accumulated tool calls executed
    ToolCalls,
    /// Length limits, content filters and anything newer
    #[serde(other)]
    Other,
}

/// Read an explicit `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatCompletionChunk {
    /// Get the first choice, if available
    pub fn first_choice(&self) -> Option<&ChunkChoice> {
        self.choices.first()
    }

    /// Get the content delta of the first choice, if available
    pub fn content(&self) -> Option<&str> {
        self.first_choice()
            .and_then(|choice| choice.delta.content.as_deref())
    }

    /// Get the finish reason of the first choice
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.first_choice().and_then(|choice| choice.finish_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_content_chunk() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1700000000,
                "model":"sgr","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"},"finish_reason":null}]}"#,
        )
        .unwrap();

        assert_eq!(chunk.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(chunk.content(), Some("Hel"));
        assert_eq!(chunk.finish_reason(), None);
    }

    #[test]
    fn test_parses_tool_call_chunk() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"m1","choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"id":"call_1","type":"function","function":{"name":"search","arguments":"{\"q\""}}
            ]},"finish_reason":"tool_calls"}]}"#,
        )
        .unwrap();

        let calls = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        let function = calls[0].function.as_ref().unwrap();
        assert_eq!(function.name.as_deref(), Some("search"));
        assert_eq!(function.arguments.as_deref(), Some("{\"q\""));
        assert_eq!(chunk.finish_reason(), Some(FinishReason::ToolCalls));
    }

    #[test]
    fn test_unknown_finish_reason_is_other() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#).unwrap();
        assert_eq!(chunk.finish_reason(), Some(FinishReason::Other));
    }

    #[test]
    fn test_metadata_only_chunk() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"id":"m1","usage":{"total_tokens":3}}"#).unwrap();
        assert!(chunk.first_choice().is_none());
    }

    #[test]
    fn test_null_choices_is_a_heartbeat() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"id":"m1","choices":null}"#).unwrap();
        assert!(chunk.first_choice().is_none());
    }

    #[test]
    fn test_null_delta_keeps_finish_reason() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[{"index":null,"delta":null,"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.content(), None);
        assert_eq!(chunk.finish_reason(), Some(FinishReason::Stop));
    }
}
