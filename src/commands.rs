use std::sync::Arc;
use tracing::info;

use crate::engine::Monitor;
use crate::models::IncomingMessage;

pub const UNKNOWN_COMMAND: &str =
    "Unknown command. Available commands: /start, /stop, /status, /help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Start,
    Stop,
    Status,
    Unknown,
}

impl Command {
    /// Exact, case-sensitive match on the whole message.
    pub fn parse(text: &str) -> Self {
        match text {
            "/help" => Command::Help,
            "/start" => Command::Start,
            "/stop" => Command::Stop,
            "/status" => Command::Status,
            _ => Command::Unknown,
        }
    }
}

pub fn help_text(target: &str) -> String {
    format!(
        "🤖 Bot help:\n\
        /start - start connection monitoring\n\
        /stop - stop monitoring\n\
        /status - current connection status\n\
        /help - this help\n\
        \n\
        Currently monitored host: {}",
        target
    )
}

/// Handles one inbound chat message. The sender is remembered as a
/// recipient before the command runs.
pub async fn dispatch(monitor: &Arc<Monitor>, message: IncomingMessage) {
    let IncomingMessage { chat_id, text } = message;
    monitor.register(&chat_id).await;

    let command = Command::parse(&text);
    info!(chat_id = %chat_id, ?command, "Command received");

    match command {
        Command::Help => monitor.reply(&chat_id, &help_text(monitor.target())).await,
        Command::Start => monitor.start(&chat_id).await,
        Command::Stop => monitor.stop(&chat_id).await,
        Command::Status => monitor.status(&chat_id).await,
        Command::Unknown => monitor.reply(&chat_id, UNKNOWN_COMMAND).await,
    }
}
