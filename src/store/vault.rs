//! SQLite-backed vault with a connection-per-call pattern
//!
//! Each method opens a fresh connection with WAL mode enabled. SQLite
//! operations here are short, so the open cost is acceptable and it keeps
//! the vault `Send + Sync` without wrapping a connection in a mutex.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};

use crate::error::{HearthError, Result};
use crate::gateway::Role;

use super::records::{Chat, ChatMessage, CheckIn, DiaryEntry, Memory, MemoryPriority, VaultExport};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chats_updated ON chats(updated_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    proactive INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, timestamp);

CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    value TEXT NOT NULL,
    priority TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_priority ON memories(priority);

CREATE TABLE IF NOT EXISTS diary (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    content TEXT NOT NULL,
    mood TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_diary_date ON diary(date DESC);

CREATE TABLE IF NOT EXISTS check_ins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scheduled_for TEXT NOT NULL,
    message TEXT NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_check_ins_pending ON check_ins(completed, scheduled_for);
"#;

/// Timestamps are stored as fixed-width RFC 3339 so text ordering matches
/// chronological ordering.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_role(raw: &str, column: usize) -> rusqlite::Result<Role> {
    Role::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("unknown role '{}'", raw).into(),
        )
    })
}

fn parse_priority(raw: &str, column: usize) -> rusqlite::Result<MemoryPriority> {
    MemoryPriority::from_str(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("unknown priority '{}'", raw).into(),
        )
    })
}

/// Local persistence for chats, messages, memories, diary and check-ins
pub struct Vault {
    path: PathBuf,
}

impl Vault {
    /// Open the vault in the given directory, creating it if necessary
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let vault = Self {
            path: dir.join("vault.db"),
        };
        vault.conn()?.execute_batch(SCHEMA)?;
        Ok(vault)
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }

    // --- chats ---

    pub fn create_chat(&self, title: &str) -> Result<Chat> {
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chats (title, created_at, updated_at) VALUES (?1, ?2, ?3)",
            (title, fmt_ts(now), fmt_ts(now)),
        )?;
        Ok(Chat {
            id: conn.last_insert_rowid(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// All chats, most recently updated first
    pub fn chats(&self) -> Result<Vec<Chat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, title, created_at, updated_at FROM chats ORDER BY updated_at DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(Chat {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: parse_ts(&row.get::<_, String>(2)?),
                updated_at: parse_ts(&row.get::<_, String>(3)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_chat(&self, id: i64) -> Result<Option<Chat>> {
        Ok(self.chats()?.into_iter().find(|c| c.id == id))
    }

    pub fn rename_chat(&self, id: i64, title: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE chats SET title = ?1, updated_at = ?2 WHERE id = ?3",
            (title, fmt_ts(Utc::now()), id),
        )?;
        if changed == 0 {
            return Err(HearthError::Storage(format!("chat {} not found", id)));
        }
        Ok(())
    }

    /// Delete a chat and, via cascade, its messages
    pub fn delete_chat(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM chats WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(HearthError::Storage(format!("chat {} not found", id)));
        }
        Ok(())
    }

    // --- messages ---

    /// Append a message and bump the parent chat's updated_at
    pub fn append_message(&self, chat_id: i64, role: Role, content: &str, proactive: bool) -> Result<ChatMessage> {
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (chat_id, role, content, timestamp, proactive) VALUES (?1, ?2, ?3, ?4, ?5)",
            (chat_id, role.as_str(), content, fmt_ts(now), proactive),
        )?;
        let id = conn.last_insert_rowid();
        conn.execute("UPDATE chats SET updated_at = ?1 WHERE id = ?2", (fmt_ts(now), chat_id))?;
        Ok(ChatMessage {
            id,
            chat_id,
            role,
            content: content.to_string(),
            timestamp: now,
            proactive,
        })
    }

    /// Messages of one chat ordered by time
    pub fn messages(&self, chat_id: i64) -> Result<Vec<ChatMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, content, timestamp, proactive
             FROM messages WHERE chat_id = ?1 ORDER BY timestamp, id",
        )?;
        let rows = stmt.query_map([chat_id], |row| {
            let role = parse_role(&row.get::<_, String>(2)?, 2)?;
            Ok(ChatMessage {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                role,
                content: row.get(3)?,
                timestamp: parse_ts(&row.get::<_, String>(4)?),
                proactive: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // --- memories ---

    /// Insert a memory, or overwrite the value and priority of an existing key
    pub fn upsert_memory(&self, key: &str, value: &str, priority: MemoryPriority) -> Result<Memory> {
        let now = Utc::now();
        let conn = self.conn()?;

        let existing: Option<(i64, String)> = conn
            .query_row("SELECT id, created_at FROM memories WHERE key = ?1", [key], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match existing {
            Some((id, created_at)) => {
                conn.execute(
                    "UPDATE memories SET value = ?1, priority = ?2, updated_at = ?3 WHERE id = ?4",
                    (value, priority.as_str(), fmt_ts(now), id),
                )?;
                Ok(Memory {
                    id,
                    key: key.to_string(),
                    value: value.to_string(),
                    priority,
                    created_at: parse_ts(&created_at),
                    updated_at: now,
                })
            }
            None => {
                conn.execute(
                    "INSERT INTO memories (key, value, priority, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    (key, value, priority.as_str(), fmt_ts(now), fmt_ts(now)),
                )?;
                Ok(Memory {
                    id: conn.last_insert_rowid(),
                    key: key.to_string(),
                    value: value.to_string(),
                    priority,
                    created_at: now,
                    updated_at: now,
                })
            }
        }
    }

    pub fn memories(&self) -> Result<Vec<Memory>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, key, value, priority, created_at, updated_at FROM memories ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let priority = parse_priority(&row.get::<_, String>(3)?, 3)?;
            Ok(Memory {
                id: row.get(0)?,
                key: row.get(1)?,
                value: row.get(2)?,
                priority,
                created_at: parse_ts(&row.get::<_, String>(4)?),
                updated_at: parse_ts(&row.get::<_, String>(5)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn reprioritize_memory(&self, id: i64, priority: MemoryPriority) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE memories SET priority = ?1, updated_at = ?2 WHERE id = ?3",
            (priority.as_str(), fmt_ts(Utc::now()), id),
        )?;
        if changed == 0 {
            return Err(HearthError::Storage(format!("memory {} not found", id)));
        }
        Ok(())
    }

    pub fn delete_memory(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM memories WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(HearthError::Storage(format!("memory {} not found", id)));
        }
        Ok(())
    }

    // --- diary ---

    pub fn append_diary(&self, content: &str, mood: &str) -> Result<DiaryEntry> {
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO diary (date, content, mood) VALUES (?1, ?2, ?3)",
            (fmt_ts(now), content, mood),
        )?;
        Ok(DiaryEntry {
            id: conn.last_insert_rowid(),
            date: now,
            content: content.to_string(),
            mood: mood.to_string(),
        })
    }

    /// Diary entries, newest first
    pub fn diary_entries(&self) -> Result<Vec<DiaryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, date, content, mood FROM diary ORDER BY date DESC, id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(DiaryEntry {
                id: row.get(0)?,
                date: parse_ts(&row.get::<_, String>(1)?),
                content: row.get(2)?,
                mood: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // --- check-ins ---

    pub fn schedule_checkin(&self, scheduled_for: DateTime<Utc>, message: &str) -> Result<CheckIn> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO check_ins (scheduled_for, message, completed) VALUES (?1, ?2, 0)",
            (fmt_ts(scheduled_for), message),
        )?;
        Ok(CheckIn {
            id: conn.last_insert_rowid(),
            scheduled_for,
            message: message.to_string(),
            completed: false,
        })
    }

    pub fn pending_checkins(&self) -> Result<Vec<CheckIn>> {
        self.checkins_where("completed = 0", [])
    }

    /// Pending check-ins whose scheduled time has passed
    pub fn due_checkins(&self, now: DateTime<Utc>) -> Result<Vec<CheckIn>> {
        self.checkins_where("completed = 0 AND scheduled_for <= ?1", [fmt_ts(now)])
    }

    fn checkins_where<P: rusqlite::Params>(&self, predicate: &str, params: P) -> Result<Vec<CheckIn>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT id, scheduled_for, message, completed FROM check_ins WHERE {} ORDER BY scheduled_for",
            predicate
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(CheckIn {
                id: row.get(0)?,
                scheduled_for: parse_ts(&row.get::<_, String>(1)?),
                message: row.get(2)?,
                completed: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn complete_checkin(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute("UPDATE check_ins SET completed = 1 WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(HearthError::Storage(format!("check-in {} not found", id)));
        }
        Ok(())
    }

    // --- export ---

    /// Snapshot the entire vault as one document
    pub fn export_all(&self) -> Result<VaultExport> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, content, timestamp, proactive FROM messages ORDER BY chat_id, timestamp, id",
        )?;
        let messages = stmt
            .query_map([], |row| {
                let role = parse_role(&row.get::<_, String>(2)?, 2)?;
                Ok(ChatMessage {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    role,
                    content: row.get(3)?,
                    timestamp: parse_ts(&row.get::<_, String>(4)?),
                    proactive: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt =
            conn.prepare("SELECT id, scheduled_for, message, completed FROM check_ins ORDER BY scheduled_for")?;
        let check_ins = stmt
            .query_map([], |row| {
                Ok(CheckIn {
                    id: row.get(0)?,
                    scheduled_for: parse_ts(&row.get::<_, String>(1)?),
                    message: row.get(2)?,
                    completed: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(VaultExport {
            export_date: Utc::now(),
            chats: self.chats()?,
            messages,
            memories: self.memories()?,
            diary: self.diary_entries()?,
            check_ins,
        })
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("path", &self.path).finish()
    }
}
