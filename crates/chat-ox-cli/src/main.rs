//! `chat-ox` - terminal chat client for a streaming agent endpoint.

mod render;

use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result, bail};
use chat_ox::{ChatClient, StreamNotification, StreamOptions, StreamOutcome};
use chat_store_ox::{
    ChatRegistry, ChatRole, ChatStore, DEFAULT_CHAT_TITLE, ExportPayload, JsonFileStore,
    NewMessage, RegistrySink,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::render::{DisplayOptions, TerminalSink, write_chat_list, write_messages};

#[derive(Parser, Debug)]
#[command(name = "chat-ox", about = "Chat with a streaming OpenAI-compatible agent")]
struct Cli {
    /// Chat database file (default: ~/.chat-ox/chats.json)
    #[arg(long, env = "CHAT_OX_DB", global = true)]
    db: Option<PathBuf>,

    /// Endpoint base URL
    #[arg(long, env = "CHAT_OX_API_BASE", global = true)]
    api_base: Option<String>,

    /// Bearer token
    #[arg(long, env = "CHAT_OX_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Model name sent with each request
    #[arg(long, env = "CHAT_OX_MODEL", global = true)]
    model: Option<String>,

    /// Print message ids
    #[arg(long, env = "CHAT_OX_SHOW_IDS", global = true)]
    show_ids: bool,

    /// Hide tool calls
    #[arg(long, env = "CHAT_OX_HIDE_TOOLS", global = true)]
    hide_tools: bool,

    /// Hide system messages
    #[arg(long, env = "CHAT_OX_HIDE_SYSTEM", global = true)]
    hide_system: bool,

    /// Hide thinking messages other than tool calls
    #[arg(long, env = "CHAT_OX_HIDE_THINKING", global = true)]
    hide_thinking: bool,

    /// Log level when `RUST_LOG` is unset
    #[arg(long, env = "CHAT_OX_LOG", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a prompt and stream the reply
    Send {
        prompt: String,
        /// Chat id or unique id prefix (default: most recent chat)
        #[arg(long)]
        chat: Option<String>,
    },
    /// Start a new chat
    New { title: Option<String> },
    /// List chats, most recent first
    List,
    /// Print a chat's messages
    Show { chat: Option<String> },
    /// Rename a chat
    Rename { chat: String, title: String },
    /// Delete a chat and its messages
    Delete { chat: String },
    /// Write every chat to a JSON file
    Export { file: PathBuf },
    /// Replace the database with an exported JSON file
    Import { file: PathBuf },
}

impl Cli {
    fn display(&self) -> DisplayOptions {
        DisplayOptions {
            show_ids: self.show_ids,
            hide_tools: self.hide_tools,
            hide_system: self.hide_system,
            hide_thinking: self.hide_thinking,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map_or_else(|| PathBuf::from("."), PathBuf::from)
                .join(".chat-ox")
                .join("chats.json")
        })
    }

    fn client(&self) -> ChatClient {
        ChatClient::builder()
            .maybe_base_url(self.api_base.clone())
            .maybe_api_key(self.api_key.clone())
            .build()
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .compact();
    let _ = subscriber.try_init();
}

/// Exact chat id, or the single chat whose id starts with `query`.
fn resolve_chat<S: ChatStore>(registry: &ChatRegistry<S>, query: &str) -> Result<String> {
    if registry.chat(query).is_some() {
        return Ok(query.to_string());
    }
    let mut matches = registry.chats().iter().filter(|c| c.id.starts_with(query));
    match (matches.next(), matches.next()) {
        (Some(chat), None) => Ok(chat.id.clone()),
        (Some(_), Some(_)) => bail!("chat id prefix `{query}` is ambiguous"),
        (None, _) => bail!("no chat matches `{query}`"),
    }
}

fn target_chat<S: ChatStore>(registry: &ChatRegistry<S>, query: Option<&str>) -> Result<String> {
    match query {
        Some(query) => resolve_chat(registry, query),
        None => registry
            .selected_chat_id()
            .map(str::to_string)
            .context("no chat available"),
    }
}

async fn send(
    cli: &Cli,
    registry: &mut ChatRegistry<JsonFileStore>,
    prompt: &str,
    chat: Option<&str>,
) -> Result<()> {
    let chat_id = target_chat(registry, chat)?;
    registry.add_message(NewMessage::new(&chat_id, ChatRole::User, prompt));

    let options = StreamOptions::builder()
        .messages(registry.conversation(&chat_id))
        .maybe_model(cli.model.clone())
        .build();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<StreamNotification>();
    let handle = cli.client().spawn_stream(options, tx);
    tracing::debug!(chat_id = %chat_id, "stream started");

    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut sink = TerminalSink::new(
        RegistrySink::new(registry, &chat_id),
        io::stdout(),
        cli.display(),
    );
    while let Some(notification) = rx.recv().await {
        notification.deliver(&mut sink);
    }

    match handle.wait().await {
        StreamOutcome::Done => Ok(()),
        StreamOutcome::Error(failure) => bail!("stream failed: {failure}"),
        StreamOutcome::Aborted => {
            eprintln!("cancelled");
            Ok(())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db_path();
    let store = JsonFileStore::open(&db_path)
        .with_context(|| format!("failed to open chat database {}", db_path.display()))?;
    let mut registry = ChatRegistry::new(store);
    registry.hydrate();

    let mut stdout = io::stdout();
    match &cli.command {
        Command::Send { prompt, chat } => {
            send(&cli, &mut registry, prompt, chat.as_deref()).await?;
        }
        Command::New { title } => {
            let chat = registry.create_chat(title.as_deref().unwrap_or(DEFAULT_CHAT_TITLE));
            writeln!(stdout, "{}", chat.id)?;
        }
        Command::List => {
            write_chat_list(&mut stdout, registry.chats(), registry.selected_chat_id())?;
        }
        Command::Show { chat } => {
            let chat_id = target_chat(&registry, chat.as_deref())?;
            if let Some(chat) = registry.chat(&chat_id) {
                writeln!(stdout, "# {}\n", chat.title)?;
            }
            write_messages(&mut stdout, registry.messages_for(&chat_id), cli.display())?;
        }
        Command::Rename { chat, title } => {
            let chat_id = resolve_chat(&registry, chat)?;
            registry.rename_chat(&chat_id, title);
        }
        Command::Delete { chat } => {
            let chat_id = resolve_chat(&registry, chat)?;
            registry.delete_chat(&chat_id);
        }
        Command::Export { file } => {
            let json = registry.export()?.to_json_pretty()?;
            std::fs::write(file, json)
                .with_context(|| format!("failed to write {}", file.display()))?;
        }
        Command::Import { file } => {
            let json = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let payload = ExportPayload::from_json(&json)
                .with_context(|| format!("{} is not a chat export", file.display()))?;
            registry.import(&payload)?;
            writeln!(
                stdout,
                "imported {} chats and {} messages",
                payload.chats.len(),
                payload.messages.len()
            )?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    run(cli).await
}
