//! Built-in companion tools
//!
//! The fixed tool set registered at startup. Every side effect lives here,
//! behind the vault, theme and notifier collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use serde_json::{Value, json};

use crate::error::{HearthError, Result};
use crate::notify::{Notifier, Permission};
use crate::store::{MemoryPriority, Vault};
use crate::theme::{ThemeSink, VibeMode};

use super::registry::{ToolArgs, ToolHandler, ToolRegistry, ToolSpec};

/// Memory key the companion writes its own instruction updates under
pub const SYSTEM_INSTRUCTION_KEY: &str = "system_instruction_update";

/// Register the fixed built-in tool set, in its canonical order
pub fn builtin_registry(
    vault: Arc<Vault>,
    theme: Arc<dyn ThemeSink>,
    notifier: Arc<dyn Notifier>,
    persona_name: &str,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolSpec::new(
            "set_vibe",
            "Changes the app theme to match the companion's mood. Available moods: electric, \
             blood-red, chilling, stark-white, blushing, aggressive, cyber-chrome",
        )
        .with_param(
            "mood",
            "The mood to set (electric, blood-red, chilling, stark-white, blushing, aggressive, cyber-chrome)",
        ),
        Arc::new(SetVibe { theme }),
    );

    registry.register(
        ToolSpec::new("write_memory", "Saves data to the local vault for long-term persistence on the device")
            .with_param("key", "The key to store the data under")
            .with_param("value", "The value to store"),
        Arc::new(WriteMemory { vault: vault.clone() }),
    );

    registry.register(
        ToolSpec::new(
            "prioritize_memory",
            "Reclassifies a stored memory as essential, normal, or bullshit",
        )
        .with_param("action", "Priority level: essential, normal, or bullshit")
        .with_param("memory_id", "The ID of the memory to prioritize"),
        Arc::new(PrioritizeMemory { vault: vault.clone() }),
    );

    registry.register(
        ToolSpec::new("search_web", "Looks up real-time news or facts (simulated for now)")
            .with_param("query", "The search query"),
        Arc::new(SearchWeb),
    );

    registry.register(
        ToolSpec::new("schedule_checkin", "Schedules a check-in at a specific time")
            .with_param("time", "The time to check in (RFC 3339, or relative like \"tomorrow 3pm\")")
            .with_param("message", "The message to send at check-in"),
        Arc::new(ScheduleCheckIn { vault: vault.clone() }),
    );

    registry.register(
        ToolSpec::new("send_push_notification", "Sends a system notification to the user's device")
            .with_param("message", "The notification message"),
        Arc::new(SendPushNotification {
            notifier,
            title: persona_name.to_string(),
        }),
    );

    registry.register(
        ToolSpec::new(
            "update_instruction",
            "Lets the companion modify its own system instructions to evolve",
        )
        .with_param("new_prompt", "The new system instruction to add or modify"),
        Arc::new(UpdateInstruction { vault: vault.clone() }),
    );

    registry.register(
        ToolSpec::new("write_diary", "Writes a private diary entry about the day")
            .with_param("content", "The diary entry content")
            .with_param("mood", "The companion's current mood"),
        Arc::new(WriteDiary { vault }),
    );

    registry
}

struct SetVibe {
    theme: Arc<dyn ThemeSink>,
}

#[async_trait]
impl ToolHandler for SetVibe {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let raw = args.str("mood")?;
        let mood = VibeMode::from_str(raw).ok_or_else(|| HearthError::BadToolArguments {
            name: "set_vibe".to_string(),
            detail: format!("unknown mood '{}'", raw),
        })?;
        self.theme.apply(mood);
        Ok(json!({ "success": true, "mood": mood.as_str() }))
    }
}

struct WriteMemory {
    vault: Arc<Vault>,
}

#[async_trait]
impl ToolHandler for WriteMemory {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let key = args.str("key")?;
        let value = args.str("value")?;
        let memory = self.vault.upsert_memory(key, value, MemoryPriority::Normal)?;
        Ok(json!({ "success": true, "id": memory.id, "key": memory.key }))
    }
}

struct PrioritizeMemory {
    vault: Arc<Vault>,
}

#[async_trait]
impl ToolHandler for PrioritizeMemory {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let action = args.str("action")?;
        let priority = MemoryPriority::from_str(action).ok_or_else(|| HearthError::BadToolArguments {
            name: "prioritize_memory".to_string(),
            detail: format!("unknown priority '{}'", action),
        })?;
        let memory_id = args.i64("memory_id")?;
        self.vault.reprioritize_memory(memory_id, priority)?;
        Ok(json!({ "success": true, "memory_id": memory_id, "priority": priority.as_str() }))
    }
}

struct SearchWeb;

#[async_trait]
impl ToolHandler for SearchWeb {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let query = args.str("query")?;
        // TODO: wire a real search backend; the manifest already advertises it
        Ok(json!({
            "success": true,
            "query": query,
            "results": [
                { "title": "Search functionality ready", "snippet": "Connect a search API in the configuration" }
            ],
            "note": "Web search is simulated until a search API is configured"
        }))
    }
}

struct ScheduleCheckIn {
    vault: Arc<Vault>,
}

#[async_trait]
impl ToolHandler for ScheduleCheckIn {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let raw_time = args.str("time")?;
        let message = args.str("message")?;
        let scheduled_for = parse_checkin_time(raw_time)?;
        let checkin = self.vault.schedule_checkin(scheduled_for, message)?;
        Ok(json!({
            "success": true,
            "id": checkin.id,
            "scheduled_for": checkin.scheduled_for,
            "message": checkin.message
        }))
    }
}

/// "tomorrow" anywhere in the string resolves to tomorrow 15:00 local time;
/// anything else must be RFC 3339.
fn parse_checkin_time(raw: &str) -> Result<DateTime<Utc>> {
    if raw.to_lowercase().contains("tomorrow") {
        let three_pm = NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default();
        let tomorrow = (Local::now() + Duration::days(1)).date_naive().and_time(three_pm);
        let resolved = tomorrow
            .and_local_timezone(Local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc::now() + Duration::days(1));
        return Ok(resolved);
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HearthError::BadToolArguments {
            name: "schedule_checkin".to_string(),
            detail: format!("unparseable time '{}': {}", raw, e),
        })
}

struct SendPushNotification {
    notifier: Arc<dyn Notifier>,
    title: String,
}

#[async_trait]
impl ToolHandler for SendPushNotification {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let message = args.str("message")?;

        let permission = match self.notifier.permission() {
            Permission::Undecided => self.notifier.request_permission(),
            decided => decided,
        };

        if permission == Permission::Granted {
            self.notifier.notify(&self.title, message);
            Ok(json!({ "success": true, "message": message }))
        } else {
            Ok(json!({
                "success": false,
                "message": message,
                "error": "Notifications not supported or denied"
            }))
        }
    }
}

struct UpdateInstruction {
    vault: Arc<Vault>,
}

#[async_trait]
impl ToolHandler for UpdateInstruction {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let new_prompt = args.str("new_prompt")?;
        self.vault
            .upsert_memory(SYSTEM_INSTRUCTION_KEY, new_prompt, MemoryPriority::Essential)?;
        Ok(json!({
            "success": true,
            "new_prompt": new_prompt,
            "note": "Instruction stored for next session"
        }))
    }
}

struct WriteDiary {
    vault: Arc<Vault>,
}

#[async_trait]
impl ToolHandler for WriteDiary {
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        let content = args.str("content")?;
        let mood = args.str("mood")?;
        let entry = self.vault.append_diary(content, mood)?;
        Ok(json!({ "success": true, "id": entry.id, "note": "Diary entry saved privately" }))
    }
}
