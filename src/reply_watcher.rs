//! Reply Watcher (C8).
//!
//! A background loop at a fixed interval (default 60s) polling each `sent` Application's
//! mailbox thread for replies, classifying interview offers by keyword (spec §4.8). Grounded on
//! `original_source/backend/app/agents/gmail_watcher.py`. The mailbox-polling call itself is a
//! stub per that file's own TODO — see DESIGN.md's Open Question resolution.
//!
//! The watcher owns its own ticker and may be started/stopped; stopping is idempotent (spec
//! §4.8), mirroring the long-lived-task-owned-by-a-single-scheduler rewrite directive in spec §9
//! (a distinct cancellation token from any per-iteration work).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::events::SharedEventBus;
use crate::model::{ApplicationId, UserId};

/// Interview-offer keyword list, carried over verbatim from `gmail_watcher.py`'s
/// `handle_reply_detected`.
const INTERVIEW_KEYWORDS: &[&str] = &["interview", "meet", "schedule", "call", "chat"];

pub fn is_interview_offer(snippet: &str) -> bool {
    let lower = snippet.to_lowercase();
    INTERVIEW_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// A detected reply to a sent application thread.
pub struct DetectedReply {
    pub user_id: UserId,
    pub application_id: ApplicationId,
    pub snippet: String,
}

/// The mailbox integration this crate does not own (spec §1 — third-party APIs are out of
/// scope). The stub implementation below always returns no replies, matching
/// `gmail_watcher.py`'s unimplemented `_check_for_replies` body.
#[async_trait::async_trait]
pub trait MailboxPoller: Send + Sync {
    async fn check_for_replies(&self) -> anyhow::Result<Vec<DetectedReply>>;
}

pub struct StubMailboxPoller;

#[async_trait::async_trait]
impl MailboxPoller for StubMailboxPoller {
    async fn check_for_replies(&self) -> anyhow::Result<Vec<DetectedReply>> {
        Ok(Vec::new())
    }
}

struct Stats {
    total_checks: u64,
    replies_detected: u64,
}

pub struct ReplyWatcher {
    interval: Duration,
    mailbox: Arc<dyn MailboxPoller>,
    events: SharedEventBus,
    stats: Mutex<Stats>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplyWatcher {
    pub fn new(events: SharedEventBus, mailbox: Arc<dyn MailboxPoller>) -> Self {
        Self {
            interval: Duration::from_secs(60),
            mailbox,
            events,
            stats: Mutex::new(Stats { total_checks: 0, replies_detected: 0 }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the background polling loop. A no-op if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }
        let this = self.clone();
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = this.check_once().await {
                            error!(error = %e, "reply watcher tick failed");
                        }
                    }
                }
            }
        }));
        info!(interval_s = self.interval.as_secs(), "reply watcher started");
    }

    /// Stop the loop. Idempotent (spec §4.8): calling this when not running, or more than once,
    /// is safe.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            let _ = handle.await;
        }
        info!("reply watcher stopped");
    }

    async fn check_once(&self) -> anyhow::Result<()> {
        {
            let mut stats = self.stats.lock().await;
            stats.total_checks += 1;
        }

        let replies = self.mailbox.check_for_replies().await?;
        for reply in replies {
            self.handle_reply_detected(reply).await;
        }
        Ok(())
    }

    async fn handle_reply_detected(&self, reply: DetectedReply) {
        {
            let mut stats = self.stats.lock().await;
            stats.replies_detected += 1;
        }

        self.events.agent_started(&reply.user_id, "reply_watcher", "HR reply detected").await;
        let truncated: String = reply.snippet.chars().take(50).collect();
        self.events
            .agent_progress(&reply.user_id, "reply_watcher", 1, 1, format!("Reply: {truncated}..."))
            .await;

        if is_interview_offer(&reply.snippet) {
            self.events
                .agent_completed(&reply.user_id, "reply_watcher", "Interview offered! Initiating prep agent.")
                .await;
        } else {
            self.events.agent_completed(&reply.user_id, "reply_watcher", "Reply received. User notified.").await;
        }
    }

    pub async fn stats_snapshot(&self) -> (u64, u64) {
        let stats = self.stats.lock().await;
        (stats.total_checks, stats.replies_detected)
    }
}
