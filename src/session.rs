//! Chat session - the application-level coordinator
//!
//! One session exists per active chat. It turns user input and gestures
//! into gateway calls, applies the results to the vault, and drives the
//! heartbeat's lifecycle. Both entry points share the single in-flight
//! slot: a trigger arriving while a call is pending is ignored, not queued.

use std::sync::Arc;

use crate::config::HeartbeatConfig;
use crate::error::Result;
use crate::gateway::{GatewayResponse, Gesture, ModelGateway, Role, Turn};
use crate::heartbeat::{HeartbeatController, ProactiveProbe, SessionSignals};
use crate::store::Vault;

/// Maximum characters of the first message used for the chat title
const TITLE_MAX_CHARS: usize = 50;

/// Derive a chat title from the first user message
pub fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

pub struct ChatSession {
    chat_id: i64,
    vault: Arc<Vault>,
    gateway: Arc<ModelGateway>,
    signals: Arc<SessionSignals>,
    heartbeat: HeartbeatController,
}

impl ChatSession {
    /// Activate a chat: build the session state and arm the heartbeat
    pub fn open(
        chat_id: i64,
        vault: Arc<Vault>,
        gateway: Arc<ModelGateway>,
        heartbeat_config: &HeartbeatConfig,
    ) -> Arc<Self> {
        let signals = Arc::new(SessionSignals::new());
        let heartbeat = HeartbeatController::new(heartbeat_config);

        let session = Arc::new(Self {
            chat_id,
            vault: vault.clone(),
            gateway: gateway.clone(),
            signals: signals.clone(),
            heartbeat,
        });

        let probe = Arc::new(ProactiveProbe::new(chat_id, vault, gateway, signals, heartbeat_config));
        session.heartbeat.start(probe);
        session
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn signals(&self) -> &Arc<SessionSignals> {
        &self.signals
    }

    /// Send a user message through the gateway.
    ///
    /// Returns `Ok(None)` when a call is already in flight and the send was
    /// ignored.
    pub async fn send(&self, content: &str) -> Result<Option<GatewayResponse>> {
        if !self.signals.begin_call() {
            tracing::debug!(chat_id = self.chat_id, "send ignored, call already in flight");
            return Ok(None);
        }
        let outcome = self.exchange(content).await;
        self.signals.end_call();
        outcome.map(Some)
    }

    async fn exchange(&self, content: &str) -> Result<GatewayResponse> {
        self.signals.touch();
        self.vault.append_message(self.chat_id, Role::User, content, false)?;

        let history = self.vault.messages(self.chat_id)?;
        if history.len() == 1 {
            self.vault.rename_chat(self.chat_id, &derive_title(content))?;
        }

        let turns: Vec<Turn> = history.iter().map(|m| m.to_turn()).collect();
        let response = self.gateway.send_message(&turns).await;

        if self.signals.is_alive() {
            self.vault
                .append_message(self.chat_id, Role::Assistant, &response.content, false)?;
        }
        self.signals.touch();
        Ok(response)
    }

    /// Report a gesture. Ignored while a call is in flight; the gesture
    /// itself is not persisted, only the assistant's reaction.
    pub async fn gesture(&self, gesture: Gesture) -> Result<Option<GatewayResponse>> {
        if !self.signals.begin_call() {
            tracing::debug!(chat_id = self.chat_id, "gesture ignored, call already in flight");
            return Ok(None);
        }
        let outcome = self.react(gesture).await;
        self.signals.end_call();
        outcome.map(Some)
    }

    async fn react(&self, gesture: Gesture) -> Result<GatewayResponse> {
        self.signals.touch();

        let history = self.vault.messages(self.chat_id)?;
        let turns: Vec<Turn> = history.iter().map(|m| m.to_turn()).collect();
        let response = self.gateway.send_gesture(gesture, &turns).await;

        if self.signals.is_alive() {
            self.vault
                .append_message(self.chat_id, Role::Assistant, &response.content, false)?;
        }
        self.signals.touch();
        Ok(response)
    }

    /// Forwarded from the front end's visibility tracking
    pub fn set_visible(&self, visible: bool) {
        self.signals.set_visible(visible);
    }

    /// Deactivate: cancel the heartbeat and mark the session dead so a
    /// still-pending call cannot write to this chat anymore.
    pub fn close(&self) {
        self.heartbeat.stop();
        self.signals.shut_down();
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession").field("chat_id", &self.chat_id).finish_non_exhaustive()
    }
}
