//! Record types persisted in the vault

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::{Role, Turn};

/// A conversation thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted message within a chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// True when the turn was injected by the heartbeat rather than the user
    pub proactive: bool,
}

impl ChatMessage {
    /// Project the stored message into a conversation turn
    pub fn to_turn(&self) -> Turn {
        Turn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// How much a memory matters to the companion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPriority {
    Essential,
    Normal,
    Bullshit,
}

impl MemoryPriority {
    /// Parse from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "essential" => Some(Self::Essential),
            "normal" => Some(Self::Normal),
            "bullshit" => Some(Self::Bullshit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Normal => "normal",
            Self::Bullshit => "bullshit",
        }
    }
}

/// A key-value memory, upserted by key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub priority: MemoryPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A private diary entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub content: String,
    pub mood: String,
}

/// A scheduled check-in, polled rather than OS-scheduled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: i64,
    pub scheduled_for: DateTime<Utc>,
    pub message: String,
    pub completed: bool,
}

/// Full vault contents as one exportable document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultExport {
    pub export_date: DateTime<Utc>,
    pub chats: Vec<Chat>,
    pub messages: Vec<ChatMessage>,
    pub memories: Vec<Memory>,
    pub diary: Vec<DiaryEntry>,
    pub check_ins: Vec<CheckIn>,
}
