//! Heartbeat - the time-driven proactive-messaging trigger
//!
//! A session-scoped controller arms one interval timer. Each tick evaluates
//! a guard (visible, alive, silent long enough, nothing in flight) and, when
//! it passes, fires a proactive probe: one randomly chosen prompt is
//! injected as a system turn, the gateway is called, and the reply is
//! persisted marked as proactive. Probe failures are swallowed; a failed
//! probe must never disturb the visible chat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HeartbeatConfig;
use crate::error::{HearthError, Result};
use crate::gateway::{ModelGateway, Role, Turn};
use crate::store::Vault;

/// Shared per-session flags the heartbeat guard and the send paths both
/// consult. Owned by the session; never a module-level singleton.
pub struct SessionSignals {
    last_activity: Mutex<Instant>,
    visible: AtomicBool,
    in_flight: AtomicBool,
    alive: AtomicBool,
}

impl SessionSignals {
    pub fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
            visible: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            alive: AtomicBool::new(true),
        }
    }

    /// Record activity now
    pub fn touch(&self) {
        let mut slot = match self.last_activity.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Instant::now();
    }

    /// Time since the last recorded activity
    pub fn idle(&self) -> Duration {
        let slot = match self.last_activity.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.elapsed()
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Claim the single in-flight slot; false means a call is already
    /// pending and the trigger must be ignored, not queued.
    pub fn begin_call(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_call(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    pub fn call_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Mark the session dead; late gateway completions check this before
    /// writing to a chat that is no longer active.
    pub fn shut_down(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Default for SessionSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// The fire condition, kept free of state so each leg is testable alone
pub fn should_fire(visible: bool, alive: bool, idle: Duration, min_silence: Duration, in_flight: bool) -> bool {
    visible && alive && idle >= min_silence && !in_flight
}

/// Work performed on each heartbeat tick
#[async_trait]
pub trait HeartbeatProbe: Send + Sync {
    async fn tick(&self);
}

/// Session-scoped timer. Holds at most one live timer; starting again
/// cancels the previous one first, so repeated starts are idempotent.
pub struct HeartbeatController {
    enabled: bool,
    interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatController {
    pub fn new(config: &HeartbeatConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            timer: Mutex::new(None),
        }
    }

    /// Arm the timer, cancelling any prior one
    pub fn start(&self, probe: Arc<dyn HeartbeatProbe>) {
        self.stop();
        if !self.enabled {
            return;
        }

        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() yields immediately; the first real tick comes later
            ticker.tick().await;
            loop {
                ticker.tick().await;
                probe.tick().await;
            }
        });

        let mut slot = match self.timer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(handle);
    }

    /// Disarm; safe to call from any state
    pub fn stop(&self) {
        let mut slot = match self.timer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// Number of live timers: zero or one by construction
    pub fn active_timers(&self) -> usize {
        let slot = match self.timer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(handle) if !handle.is_finished() => 1,
            _ => 0,
        }
    }
}

impl Drop for HeartbeatController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The production probe: injects a proactive prompt and folds the reply
/// into the persisted history.
pub struct ProactiveProbe {
    chat_id: i64,
    vault: Arc<Vault>,
    gateway: Arc<ModelGateway>,
    signals: Arc<SessionSignals>,
    prompts: Vec<String>,
    min_silence: Duration,
}

impl ProactiveProbe {
    pub fn new(
        chat_id: i64,
        vault: Arc<Vault>,
        gateway: Arc<ModelGateway>,
        signals: Arc<SessionSignals>,
        config: &HeartbeatConfig,
    ) -> Self {
        Self {
            chat_id,
            vault,
            gateway,
            signals,
            prompts: config.proactive_prompts.clone(),
            min_silence: Duration::from_secs(config.min_silence_secs),
        }
    }

    fn pick_prompt(&self) -> Option<&str> {
        if self.prompts.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..self.prompts.len());
        Some(&self.prompts[index])
    }

    async fn fire(&self) -> Result<()> {
        let Some(prompt) = self.pick_prompt() else {
            return Ok(());
        };
        tracing::debug!(chat_id = self.chat_id, "proactive probe firing");

        let history = self.vault.messages(self.chat_id)?;
        let mut turns: Vec<Turn> = history.iter().map(|m| m.to_turn()).collect();
        turns.push(Turn::system(prompt));

        let response = self.gateway.send_message(&turns).await;

        // The session may have been closed while the call was pending
        if self.signals.is_alive() {
            self.vault
                .append_message(self.chat_id, Role::Assistant, &response.content, true)?;
        }
        self.signals.touch();
        Ok(())
    }
}

#[async_trait]
impl HeartbeatProbe for ProactiveProbe {
    async fn tick(&self) {
        let fire = should_fire(
            self.signals.is_visible(),
            self.signals.is_alive(),
            self.signals.idle(),
            self.min_silence,
            self.signals.call_in_flight(),
        );
        if !fire {
            return;
        }

        // Claim the in-flight slot; a user send racing us wins
        if !self.signals.begin_call() {
            return;
        }
        let outcome = self.fire().await;
        self.signals.end_call();

        if let Err(e) = outcome {
            note_probe_failure(&e);
        }
    }
}

/// Deliberate log-and-continue policy for the proactive path
pub(crate) fn note_probe_failure(err: &HearthError) {
    tracing::warn!(error = %err, "proactive probe failed; chat left untouched");
}
