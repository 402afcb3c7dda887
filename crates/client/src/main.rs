//! Chillow - terminal chat
//!
//! Opens a conversation with one friend and relays stdin lines as messages.
//!
//! ```text
//! chillow <friend-id>
//! ```
//!
//! Commands: `/edit <id> <text>`, `/delete <id>`, `/older`, `/quit`.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chillow_client::{
    logging, ChatClient, ChatNotice, ChatSession, ClientConfig, HistoryLoad, SendOptions,
    StoredMessage,
};
use chillow_shared::{MessageId, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

enum Command<'a> {
    Send(&'a str),
    Edit(MessageId, &'a str),
    Delete(MessageId),
    Older,
    Quit,
}

fn parse_command(line: &str) -> Result<Command<'_>> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line));
    };
    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    match name {
        "edit" => {
            let (id, text) = args.trim().split_once(' ').context("usage: /edit <id> <text>")?;
            Ok(Command::Edit(id.parse().context("message id must be a number")?, text))
        }
        "delete" => Ok(Command::Delete(
            args.trim().parse().context("usage: /delete <id>")?,
        )),
        "older" => Ok(Command::Older),
        "quit" => Ok(Command::Quit),
        other => anyhow::bail!("unknown command /{other}"),
    }
}

/// Prints what changed in the conversation since the last render.
#[derive(Default)]
struct Transcript {
    shown: HashMap<MessageId, StoredMessage>,
}

impl Transcript {
    fn render(&mut self, messages: Vec<StoredMessage>) {
        for message in messages {
            let label = if message.is_own { "you" } else { "them" };
            match self.shown.get(&message.id) {
                None if message.is_deleted => println!("[{}] {label}: (deleted)", message.id),
                None => println!(
                    "[{}] {} {label}: {}",
                    message.id,
                    message.created_at.format("%H:%M"),
                    describe(&message)
                ),
                Some(previous) if message.is_deleted && !previous.is_deleted => {
                    println!("[{}] deleted", message.id)
                }
                Some(previous) if previous.edited_at != message.edited_at && !message.is_deleted => {
                    println!("[{}] edited: {}", message.id, describe(&message))
                }
                Some(previous) if message.is_own && message.is_read && !previous.is_read => {
                    println!("[{}] read", message.id)
                }
                Some(_) => {}
            }
            self.shown.insert(message.id, message);
        }
    }
}

fn describe(message: &StoredMessage) -> String {
    match (&message.attachment_url, message.content.is_empty()) {
        (Some(url), true) => format!("<{} {url}>", message.kind.as_str()),
        (Some(url), false) => format!("{} <{} {url}>", message.content, message.kind.as_str()),
        (None, _) => message.content.clone(),
    }
}

async fn run_command(session: &ChatSession, friend_id: UserId, command: Command<'_>) -> Result<()> {
    match command {
        Command::Send("") => {}
        Command::Send(text) => session.send_message(friend_id, text, SendOptions::default())?,
        Command::Edit(id, text) => session.edit_message(friend_id, id, text)?,
        Command::Delete(id) => session.delete_message(friend_id, id)?,
        Command::Older => match session.load_older(friend_id).await? {
            HistoryLoad::Loaded { added: 0, .. } => println!("-- no older messages --"),
            HistoryLoad::Loaded { added, .. } => println!("-- loaded {added} older messages --"),
            HistoryLoad::Discarded => {}
        },
        Command::Quit => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let friend_id: UserId = std::env::args()
        .nth(1)
        .context("usage: chillow <friend-id>")?
        .parse()
        .context("friend id must be a number")?;
    let config = ClientConfig::from_env()?;

    let client = ChatClient::start(config).await?;
    let session = client.session().clone();
    let mut notices = session.notices();

    let friends = session.load_friends().await?;
    match friends.iter().find(|summary| summary.friend_id == friend_id) {
        Some(summary) => println!("chatting with {} ({} unread)", summary.nickname, summary.unread_count),
        None => chillow_client::log_warn!("{} is not in your friend list", friend_id),
    }
    session.open_room(friend_id)?;

    let mut transcript = Transcript::default();
    if let HistoryLoad::Loaded { .. } = session.load_history(friend_id).await? {
        transcript.render(session.messages(friend_id));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(ChatNotice::MessagesChanged { .. }) => transcript.render(session.messages(friend_id)),
                Ok(ChatNotice::TypingChanged { typing: true, .. }) => println!("-- typing --"),
                Ok(ChatNotice::PresenceChanged { online, .. }) => {
                    println!("-- {} --", if online { "online" } else { "offline" })
                }
                Ok(ChatNotice::ConnectionChanged(state)) => println!("-- connection {state:?} --"),
                Ok(ChatNotice::RoomRevoked { message, .. }) => {
                    println!("!! {message}");
                    break;
                }
                Ok(ChatNotice::HistoryFailed { message, .. }) => println!("!! {message}"),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = run_command(&session, friend_id, command).await {
                            println!("!! {e}");
                        }
                    }
                    Err(e) => println!("!! {e}"),
                }
            }
        }
    }

    client.shutdown();
    Ok(())
}
