//! Vault persistence layer - SQLite-backed records for chats, messages,
//! memories, diary entries and check-ins

mod records;
mod vault;

pub use records::{Chat, ChatMessage, CheckIn, DiaryEntry, Memory, MemoryPriority, VaultExport};
pub use vault::Vault;
