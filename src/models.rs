use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RecipientMode;

/// Opaque chat identifier as handed over by the chat platform.
pub type ChatId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Up,
    Down,
}

impl From<bool> for Status {
    fn from(reachable: bool) -> Self {
        if reachable { Status::Up } else { Status::Down }
    }
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MonitorState {
    pub enabled: bool,
    pub last_known_reachable: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

impl MonitorState {
    /// Stores a probe outcome. Returns the new status only when it differs
    /// from the last known one.
    pub fn record(&mut self, reachable: bool) -> Option<Status> {
        self.last_checked = Some(Utc::now());
        if reachable == self.last_known_reachable {
            return None;
        }
        self.last_known_reachable = reachable;
        Some(reachable.into())
    }
}

/// Who receives transition broadcasts.
#[derive(Debug)]
pub enum Recipients {
    /// Only the most recent sender.
    Single(Option<ChatId>),
    /// Every distinct sender ever seen, in arrival order.
    Multi(Vec<ChatId>),
}

impl Recipients {
    pub fn new(mode: RecipientMode) -> Self {
        match mode {
            RecipientMode::Single => Recipients::Single(None),
            RecipientMode::Multi => Recipients::Multi(Vec::new()),
        }
    }

    /// Returns true when the identifier was not the current recipient before.
    pub fn register(&mut self, chat_id: &str) -> bool {
        match self {
            Recipients::Single(current) => {
                if current.as_deref() == Some(chat_id) {
                    return false;
                }
                *current = Some(chat_id.to_string());
                true
            }
            Recipients::Multi(known) => {
                if known.iter().any(|id| id == chat_id) {
                    return false;
                }
                known.push(chat_id.to_string());
                true
            }
        }
    }

    pub fn list(&self) -> Vec<ChatId> {
        match self {
            Recipients::Single(current) => current.iter().cloned().collect(),
            Recipients::Multi(known) => known.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Recipients::Single(current) => usize::from(current.is_some()),
            Recipients::Multi(known) => known.len(),
        }
    }

    pub fn mode(&self) -> RecipientMode {
        match self {
            Recipients::Single(_) => RecipientMode::Single,
            Recipients::Multi(_) => RecipientMode::Multi,
        }
    }
}

/// Read-only view served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub target: String,
    pub monitoring: bool,
    pub last_known: Status,
    pub last_checked: Option<DateTime<Utc>>,
    pub recipient_mode: RecipientMode,
    pub recipients: usize,
}
