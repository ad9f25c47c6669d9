use crate::error::CommonRequestError;
use futures_util::{Stream, StreamExt, stream::BoxStream};
use serde::Deserialize;

/// Server-Sent Events parser for streaming responses
///
/// Bytes are buffered until a full line is available, so frames and multi-byte
/// characters split across network chunks are reassembled before decoding.
pub struct SseParser {
    /// Raw body chunks
    byte_stream: BoxStream<'static, Result<bytes::Bytes, CommonRequestError>>,
    /// Bytes received but not yet terminated by a newline
    buffer: Vec<u8>,
    /// `data:` lines of the event currently being assembled
    data_lines: Vec<String>,
}

impl SseParser {
    /// Parse the body of an HTTP response.
    #[must_use]
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(response.bytes_stream())
    }

    /// Parse an arbitrary stream of body chunks.
    pub fn new<S, E>(byte_stream: S) -> Self
    where
        S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
        E: Into<CommonRequestError>,
    {
        Self {
            byte_stream: byte_stream.map(|chunk| chunk.map_err(Into::into)).boxed(),
            buffer: Vec::new(),
            data_lines: Vec::new(),
        }
    }

    /// Get the next parsed event from the stream
    ///
    /// # Errors
    ///
    /// Fails when the underlying body errors, a line is not valid UTF-8, or an
    /// event payload is not valid JSON for `T`.
    pub async fn next_event<T: for<'de> Deserialize<'de>>(
        &mut self,
    ) -> Result<Option<T>, CommonRequestError> {
        loop {
            if let Some(event) = self.try_parse_event_from_buffer::<T>()? {
                return Ok(Some(event));
            }

            if let Some(chunk_result) = self.byte_stream.next().await {
                let chunk = chunk_result?;
                self.buffer.extend_from_slice(&chunk);
            } else {
                // Stream ended, process any remaining data
                if let Some(event) = self.try_parse_final_event::<T>()? {
                    return Ok(Some(event));
                }
                return Ok(None);
            }
        }
    }

    /// Try to parse an event from the current buffer
    fn try_parse_event_from_buffer<T: for<'de> Deserialize<'de>>(
        &mut self,
    ) -> Result<Option<T>, CommonRequestError> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes = self.buffer.drain(..=pos).collect::<Vec<u8>>();
            let line = String::from_utf8(line_bytes)?;

            if let Some(event) = self.process_line::<T>(&line)? {
                return Ok(Some(event));
            }
        }

        Ok(None)
    }

    /// Try to parse any remaining data as final event
    fn try_parse_final_event<T: for<'de> Deserialize<'de>>(
        &mut self,
    ) -> Result<Option<T>, CommonRequestError> {
        if !self.buffer.is_empty() {
            let line = String::from_utf8(std::mem::take(&mut self.buffer))?;
            if let Some(event) = self.process_line::<T>(&line)? {
                return Ok(Some(event));
            }
        }

        self.finalize_event::<T>()
    }

    /// Feed one line into the event under construction
    fn process_line<T: for<'de> Deserialize<'de>>(
        &mut self,
        line: &str,
    ) -> Result<Option<T>, CommonRequestError> {
        let trimmed = line.trim_end_matches(['\n', '\r']);

        if trimmed.is_empty() {
            return self.finalize_event();
        }

        // Comment lines double as keep-alive heartbeats
        if trimmed.starts_with(':') {
            return Ok(None);
        }

        if let Some(rest) = trimmed.strip_prefix("data:") {
            let data = rest.strip_prefix(' ').unwrap_or(rest);

            if data == "[DONE]" {
                self.data_lines.clear();
                return Ok(None);
            }

            self.data_lines.push(data.to_string());
            return Ok(None);
        }

        // Ignore other SSE fields (event, id, retry)
        Ok(None)
    }

    /// Decode the accumulated data lines as one event
    fn finalize_event<T: for<'de> Deserialize<'de>>(
        &mut self,
    ) -> Result<Option<T>, CommonRequestError> {
        if self.data_lines.is_empty() {
            return Ok(None);
        }

        let payload = self.data_lines.join("\n");
        self.data_lines.clear();

        if payload.trim().is_empty() {
            return Ok(None);
        }

        let event: T = serde_json::from_str(&payload).map_err(|e| {
            CommonRequestError::InvalidEventData(format!("JSON parse error: {e}"))
        })?;

        Ok(Some(event))
    }
}
