//! Event Bus (C2).
//!
//! Contract (spec §4.2): `subscribe(user_id) -> handle` and `emit(user_id, event)`, best-effort
//! at-most-once per-subscriber delivery; a subscriber with a full outbound buffer is dropped
//! rather than blocking emission to the rest.
//!
//! Grounded on the tagged-enum shape of `src/orchestrator/event_bus.rs` (`#[serde(tag = "type",
//! content = "payload")]`) but *not* its global-broadcast delivery semantics — a `broadcast`
//! channel's lagged-receiver model does not give per-subscriber drop-on-full, and a single
//! global channel fans every event out to every user. The per-user `HashMap` + copy-then-send-
//! then-drop-dead pattern is grounded instead on
//! `original_source/backend/app/core/event_bus.py`'s `_connections: Dict[str, Set[WebSocket]]`
//! and its `emit()` method.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::model::UserId;

/// One of the eight event types named in spec §4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentStarted { agent: String, plan: String },
    AgentProgress { agent: String, step: u32, total_steps: u32, current_action: String },
    AgentCompleted { agent: String, result_summary: String },
    AgentError { agent: String, error_message: String },
    /// Carries an emoji-prefixed human-readable log line, mirroring
    /// `original_source/.../event_bus.py`'s `emit_log_entry` (and the fact that
    /// `emit_agent_progress` there also emits a `log_entry` — the same duality is followed by
    /// the `EventBus::agent_progress` helper below).
    LogEntry { message: String },
    WorkflowUpdate { workflow: String, status: String },
    ApprovalRequested { application_id: String, kind: String },
    Pong,
}

const SUBSCRIBER_BUFFER: usize = 256;

/// A handle returned by `subscribe`; dropping it unregisters the subscriber on its next failed
/// send (lazy cleanup, matching the original's "send, then prune dead" pattern rather than an
/// explicit unsubscribe call).
pub struct Subscription {
    pub user_id: UserId,
    pub receiver: mpsc::Receiver<AgentEvent>,
}

struct Subscriber {
    sender: mpsc::Sender<AgentEvent>,
}

pub struct EventBus {
    subscribers: Mutex<HashMap<UserId, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(HashMap::new()) }
    }

    pub async fn subscribe(&self, user_id: UserId) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut subs = self.subscribers.lock().await;
        subs.entry(user_id.clone()).or_default().push(Subscriber { sender: tx });
        Subscription { user_id, receiver: rx }
    }

    /// Deliver `event` to every current subscriber of `user_id`. Non-blocking: a subscriber
    /// whose buffer is full is dropped rather than awaited on (spec §4.2's "emit is
    /// non-blocking" rule). FIFO per subscriber is preserved because `try_send` on a bounded
    /// `mpsc::Sender` never reorders.
    pub async fn emit(&self, user_id: &UserId, event: AgentEvent) {
        let mut subs = self.subscribers.lock().await;
        let Some(list) = subs.get_mut(user_id) else { return };

        list.retain(|sub| match sub.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if list.is_empty() {
            subs.remove(user_id);
        }
    }

    pub async fn agent_started(&self, user_id: &UserId, agent: impl Into<String>, plan: impl Into<String>) {
        self.emit(user_id, AgentEvent::AgentStarted { agent: agent.into(), plan: plan.into() }).await;
    }

    /// Mirrors `original_source/.../event_bus.py`'s `emit_agent_progress`, which also emits a
    /// `log_entry` alongside the structured progress event.
    pub async fn agent_progress(
        &self,
        user_id: &UserId,
        agent: impl Into<String>,
        step: u32,
        total_steps: u32,
        current_action: impl Into<String>,
    ) {
        let agent = agent.into();
        let current_action = current_action.into();
        self.emit(
            user_id,
            AgentEvent::AgentProgress {
                agent: agent.clone(),
                step,
                total_steps,
                current_action: current_action.clone(),
            },
        )
        .await;
        self.emit(user_id, AgentEvent::LogEntry { message: format!("{agent}: {current_action}") }).await;
    }

    pub async fn agent_completed(&self, user_id: &UserId, agent: impl Into<String>, result_summary: impl Into<String>) {
        self.emit(user_id, AgentEvent::AgentCompleted { agent: agent.into(), result_summary: result_summary.into() }).await;
    }

    pub async fn agent_error(&self, user_id: &UserId, agent: impl Into<String>, error_message: impl Into<String>) {
        self.emit(user_id, AgentEvent::AgentError { agent: agent.into(), error_message: error_message.into() }).await;
    }

    pub async fn workflow_update(&self, user_id: &UserId, workflow: impl Into<String>, status: impl Into<String>) {
        self.emit(user_id, AgentEvent::WorkflowUpdate { workflow: workflow.into(), status: status.into() }).await;
    }

    pub async fn approval_requested(&self, user_id: &UserId, application_id: impl Into<String>, kind: impl Into<String>) {
        self.emit(user_id, AgentEvent::ApprovalRequested { application_id: application_id.into(), kind: kind.into() }).await;
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_is_per_user_not_global() {
        let bus = EventBus::new();
        let user_a = UserId::from("a");
        let user_b = UserId::from("b");

        let mut sub_a = bus.subscribe(user_a.clone()).await;
        let mut sub_b = bus.subscribe(user_b.clone()).await;

        bus.agent_started(&user_a, "cv_tailor", "tailoring").await;

        let received_a = sub_a.receiver.recv().await.unwrap();
        assert!(matches!(received_a, AgentEvent::AgentStarted { .. }));

        // user_b never subscribed to anything emitted for user_a.
        let nothing_for_b = sub_b.receiver.try_recv();
        assert!(nothing_for_b.is_err());
    }

    #[tokio::test]
    async fn full_buffer_drops_subscriber_without_blocking_others() {
        let bus = EventBus::new();
        let user = UserId::from("u");

        let full_sub = bus.subscribe(user.clone()).await;
        // Fill the full_sub's buffer without draining it.
        for _ in 0..SUBSCRIBER_BUFFER {
            bus.emit(&user, AgentEvent::Pong).await;
        }

        let mut healthy_sub = bus.subscribe(user.clone()).await;
        // One more emit should drop full_sub but still reach healthy_sub.
        bus.emit(&user, AgentEvent::Pong).await;
        let got = healthy_sub.receiver.try_recv();
        assert!(got.is_ok());

        drop(full_sub);
    }

    #[tokio::test]
    async fn fifo_order_preserved_per_subscriber() {
        let bus = EventBus::new();
        let user = UserId::from("u");
        let mut sub = bus.subscribe(user.clone()).await;

        bus.agent_started(&user, "a", "plan").await;
        bus.agent_completed(&user, "a", "done").await;

        let first = sub.receiver.recv().await.unwrap();
        let second = sub.receiver.recv().await.unwrap();
        assert!(matches!(first, AgentEvent::AgentStarted { .. }));
        assert!(matches!(second, AgentEvent::AgentCompleted { .. }));
    }
}
