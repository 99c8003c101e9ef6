//! Line-oriented terminal chat client
//!
//! Drives a `ChatSession` over the HTTP client. Plain lines are sent as
//! messages; lines starting with `/` are commands.

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::db::{ConversationId, Role};
use crate::runtime::{ChatSession, SendOutcome, SessionError, SessionEvent};
use crate::state_machine::{EntryKey, MessageStatus, MessageView};
use crate::store::ConversationStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const HELP: &str = "\
Commands:
  /new [title]    start a new conversation
  /open <id>      open an existing conversation
  /list           list conversations
  /delete <id>    delete a conversation
  /help           show this help
  /quit           exit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    New(Option<String>),
    Open(ConversationId),
    List,
    Delete(ConversationId),
    Help,
    Quit,
    Invalid(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };

        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(n, a)| (n, a.trim()));
        let id = || -> Result<ConversationId, String> {
            arg.parse()
                .map_err(|_| format!("/{name} needs a numeric conversation id"))
        };

        match name {
            "new" => Command::New((!arg.is_empty()).then(|| arg.to_string())),
            "open" => id().map_or_else(Command::Invalid, Command::Open),
            "delete" => id().map_or_else(Command::Invalid, Command::Delete),
            "list" => Command::List,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Invalid(format!("Unknown command: /{other}")),
        }
    }
}

fn render_entry(view: &MessageView) -> String {
    let who = match view.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    match view.status {
        MessageStatus::Confirmed => format!("{who}: {}", view.content),
        MessageStatus::Sending => format!("{who}: {} (sending)", view.content),
        MessageStatus::Pending => format!("{who}: ..."),
        MessageStatus::Unsent => format!("{who}: {} (not sent)", view.content),
        MessageStatus::Error => format!("{who} [error]: {}", view.content),
    }
}

/// Print session events until the channel closes
async fn print_events(mut rx: broadcast::Receiver<SessionEvent>) {
    let mut printed: HashSet<EntryKey> = HashSet::new();
    loop {
        match rx.recv().await {
            Ok(SessionEvent::TimelineChanged(entries)) => {
                // In-flight entries are shown once they settle
                for entry in entries.iter().filter(|e| {
                    !matches!(e.status, MessageStatus::Sending | MessageStatus::Pending)
                }) {
                    if printed.insert(entry.key) {
                        println!("{}", render_entry(entry));
                    }
                }
            }
            Ok(SessionEvent::ConversationChanged(Some(conversation))) => {
                println!("-- #{} {} --", conversation.id, conversation.title);
                printed.clear();
            }
            Ok(SessionEvent::Notification(n)) => {
                eprintln!("! {}: {}", n.title, n.description);
            }
            Ok(SessionEvent::ConversationChanged(None) | SessionEvent::LoadingChanged(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Terminal fell behind session events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Run the terminal client until `/quit` or end of input
pub async fn run(
    config: ClientConfig,
    open: Option<ConversationId>,
) -> Result<(), Box<dyn std::error::Error>> {
    let identity = config.identity();
    let client = Arc::new(ApiClient::new(&config.server_url, identity.clone())?);
    let session = ChatSession::new(client.clone(), client.clone(), identity);
    let printer = tokio::spawn(print_events(session.subscribe()));

    println!("Connected to {}. Type /help for commands.", config.server_url);
    let opened = match open {
        Some(id) => session.load_conversation(id).await.map(|()| id),
        None => session.start_new_conversation(None).await,
    };
    if let Err(e) = opened {
        eprintln!("{e}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Send(text) => match session.send_user_message(&text).await {
                Ok(SendOutcome::Skipped) if session.conversation().is_none() => {
                    eprintln!("No conversation open. Use /new or /open <id>.");
                }
                Ok(_) => {}
                Err(SessionError::Busy) => eprintln!("Still waiting for the last reply."),
                Err(e) => eprintln!("{e}"),
            },
            Command::New(title) => {
                if let Err(e) = session.start_new_conversation(title.as_deref()).await {
                    eprintln!("{e}");
                }
            }
            Command::Open(id) => {
                if let Err(e) = session.load_conversation(id).await {
                    eprintln!("{e}");
                }
            }
            Command::List => match client.list_conversations().await {
                Ok(conversations) => {
                    for c in conversations {
                        println!(
                            "#{:<5} {:<40} {}",
                            c.id,
                            c.title,
                            c.updated_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
                Err(e) => eprintln!("Failed to list conversations: {e}"),
            },
            Command::Delete(id) => match client.delete_conversation(id).await {
                Ok(true) => println!("Deleted #{id}"),
                Ok(false) => eprintln!("Conversation not found: {id}"),
                Err(e) => eprintln!("Failed to delete conversation: {e}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Invalid(message) => eprintln!("{message}"),
        }
    }

    drop(session);
    let _ = printer.await;
    Ok(())
}
