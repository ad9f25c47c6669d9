//! Terminal output for stored chats and live streams.

use std::io::Write;

use chat_ox::{HeaderMap, StreamCallbacks, StreamFailure, ToolCallInfo};
use chat_store_ox::{Chat, ChatMessage, ChatRole, ChatStore, RegistrySink, TOOL_CALL_KIND};

/// Which stored or streamed entries are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub show_ids: bool,
    pub hide_tools: bool,
    pub hide_system: bool,
    pub hide_thinking: bool,
}

impl DisplayOptions {
    pub fn is_visible(&self, message: &ChatMessage) -> bool {
        match message.role {
            ChatRole::System => !self.hide_system,
            ChatRole::Thinking if is_tool_call(message) => !self.hide_tools,
            ChatRole::Thinking => !self.hide_thinking,
            ChatRole::User | ChatRole::Assistant => true,
        }
    }
}

fn is_tool_call(message: &ChatMessage) -> bool {
    message
        .meta
        .as_ref()
        .and_then(|meta| meta.get("kind"))
        .and_then(|kind| kind.as_str())
        == Some(TOOL_CALL_KIND)
}

fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::System => "system",
        ChatRole::Thinking => "thinking",
    }
}

fn tool_label(name: Option<&str>) -> &str {
    name.filter(|n| !n.is_empty()).unwrap_or("tool")
}

pub fn write_chat_list<W: Write>(
    out: &mut W,
    chats: &[Chat],
    selected: Option<&str>,
) -> std::io::Result<()> {
    for chat in chats {
        let marker = if selected == Some(chat.id.as_str()) { '*' } else { ' ' };
        write!(
            out,
            "{marker} {}  {}  {}",
            chat.id,
            chat.updated_at.to_iso_string(),
            chat.title
        )?;
        if let Some(agent_id) = &chat.agent_id {
            write!(out, "  [agent {agent_id}]")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn write_messages<'a, W, I>(out: &mut W, messages: I, options: DisplayOptions) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a ChatMessage>,
{
    for message in messages.into_iter().filter(|m| options.is_visible(m)) {
        let label = if is_tool_call(message) {
            let name = message
                .meta
                .as_ref()
                .and_then(|meta| meta.get("name"))
                .and_then(|name| name.as_str());
            format!("tool {}", tool_label(name))
        } else {
            role_label(message.role).to_string()
        };

        if options.show_ids {
            writeln!(out, "[{label} {}]", message.id)?;
        } else {
            writeln!(out, "[{label}]")?;
        }
        writeln!(out, "{}", message.content)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Records a stream into the registry while echoing it to the terminal.
pub struct TerminalSink<'a, S: ChatStore, W> {
    inner: RegistrySink<'a, S>,
    out: W,
    options: DisplayOptions,
    /// Whether the current line has unterminated streamed text
    mid_line: bool,
}

impl<'a, S: ChatStore, W: Write> TerminalSink<'a, S, W> {
    pub fn new(inner: RegistrySink<'a, S>, out: W, options: DisplayOptions) -> Self {
        Self {
            inner,
            out,
            options,
            mid_line: false,
        }
    }

    pub fn into_error(self) -> Option<StreamFailure> {
        self.inner.into_error()
    }

    fn end_line(&mut self) {
        if self.mid_line {
            self.print(format_args!("\n"));
            self.mid_line = false;
        }
    }

    fn print(&mut self, args: std::fmt::Arguments<'_>) {
        if let Err(err) = self.out.write_fmt(args).and_then(|()| self.out.flush()) {
            tracing::debug!(error = %err, "terminal write failed");
        }
    }
}

impl<S: ChatStore, W: Write> StreamCallbacks for TerminalSink<'_, S, W> {
    fn on_headers(&mut self, headers: &HeaderMap) {
        self.inner.on_headers(headers);
    }

    fn on_new_message(&mut self, message_id: &str) {
        self.inner.on_new_message(message_id);
        if self.options.show_ids {
            self.end_line();
            self.print(format_args!("[assistant {message_id}]\n"));
        }
    }

    fn on_delta(&mut self, text: &str, message_id: Option<&str>) {
        self.inner.on_delta(text, message_id);
        self.print(format_args!("{text}"));
        self.mid_line = !text.ends_with('\n');
    }

    fn on_tool_call(&mut self, tool_call: &ToolCallInfo) {
        self.inner.on_tool_call(tool_call);
        if self.options.hide_tools {
            return;
        }
        self.end_line();
        let name = tool_label(tool_call.name.as_deref()).to_string();
        self.print(format_args!("[tool {name}] {}\n", tool_call.arguments));
    }

    fn on_done(&mut self) {
        self.inner.on_done();
        self.end_line();
    }

    fn on_error(&mut self, error: &StreamFailure) {
        self.inner.on_error(error);
        self.end_line();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_ox_common::Timestamp;
    use chat_store_ox::{ChatRegistry, MemoryStore};
    use serde_json::{Map, json};

    fn message(role: ChatRole, content: &str, kind: Option<&str>) -> ChatMessage {
        ChatMessage {
            id: format!("{}-id", role_label(role)),
            chat_id: "c1".to_string(),
            role,
            content: content.to_string(),
            created_at: Timestamp::now(),
            meta: kind.map(|kind| {
                let mut meta = Map::new();
                meta.insert("kind".to_string(), json!(kind));
                meta.insert("name".to_string(), json!("search"));
                meta
            }),
        }
    }

    #[test]
    fn test_visibility_flags() {
        let system = message(ChatRole::System, "rules", None);
        let tool = message(ChatRole::Thinking, "{}", Some(TOOL_CALL_KIND));
        let thought = message(ChatRole::Thinking, "hmm", None);
        let reply = message(ChatRole::Assistant, "hi", None);

        let all = DisplayOptions::default();
        assert!([&system, &tool, &thought, &reply].iter().all(|m| all.is_visible(m)));

        let quiet = DisplayOptions {
            hide_tools: true,
            hide_system: true,
            ..DisplayOptions::default()
        };
        assert!(!quiet.is_visible(&system));
        assert!(!quiet.is_visible(&tool));
        assert!(quiet.is_visible(&thought));
        assert!(quiet.is_visible(&reply));

        let no_thinking = DisplayOptions {
            hide_thinking: true,
            ..DisplayOptions::default()
        };
        assert!(no_thinking.is_visible(&tool));
        assert!(!no_thinking.is_visible(&thought));
    }

    #[test]
    fn test_write_messages_labels_tools_and_ids() {
        let messages = [
            message(ChatRole::User, "find rust", None),
            message(ChatRole::Thinking, "{\"q\":\"rust\"}", Some(TOOL_CALL_KIND)),
        ];
        let mut out = Vec::new();
        let options = DisplayOptions {
            show_ids: true,
            ..DisplayOptions::default()
        };
        write_messages(&mut out, &messages, options).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "[user user-id]\nfind rust\n\n[tool search thinking-id]\n{\"q\":\"rust\"}\n\n"
        );
    }

    #[test]
    fn test_terminal_sink_echoes_and_records() {
        let mut registry = ChatRegistry::new(MemoryStore::new());
        registry.hydrate();
        let chat_id = registry.chats()[0].id.clone();

        let mut out = Vec::new();
        {
            let mut sink = TerminalSink::new(
                RegistrySink::new(&mut registry, &chat_id),
                &mut out,
                DisplayOptions::default(),
            );
            sink.on_new_message("m1");
            sink.on_delta("Hello", Some("m1"));
            sink.on_tool_call(&ToolCallInfo {
                id: None,
                index: 0,
                name: Some("lookup".to_string()),
                arguments: "{}".to_string(),
            });
            sink.on_done();
            assert!(sink.into_error().is_none());
        }

        assert_eq!(String::from_utf8(out).unwrap(), "Hello\n[tool lookup] {}\n");
        assert_eq!(registry.message("m1").unwrap().content, "Hello");
    }
}
