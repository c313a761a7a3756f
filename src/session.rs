//! Session Store (C11).
//!
//! Append-only log of messages per (user, session), with two required queries: *last N* (for the
//! history prompt) and *most recent assistant message with metadata* (for continuation logic).
//! Contract demands atomic append and a consistent read-your-writes view within a single user
//! turn (spec §4.11) — grounded on `src/memory/history.rs`'s JSONL-with-advisory-locking pattern
//! (`fs2::FileExt::try_lock_exclusive`, `0o600` permissions, bounded retry) generalised to one
//! file per (user, session) rather than one global history file, and on
//! `src/orchestrator/session.rs`'s file-backed-snapshot `SessionManager` shape for the
//! save/load/clear API surface.

use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

#[cfg(unix)]
use fs2::FileExt;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use crate::model::{Message, UserId, SessionId};

const MAX_RETRIES: usize = 10;
const RETRY_SLEEP: Duration = Duration::from_millis(100);

pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, user_id: &UserId, session_id: &SessionId) -> PathBuf {
        self.base_dir.join(&user_id.0).join(format!("{}.jsonl", session_id.0))
    }

    /// Atomically append one message to the session's log.
    pub async fn append(&self, user_id: &UserId, session_id: &SessionId, message: &Message) -> Result<()> {
        let path = self.path_for(user_id, session_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.context("failed to create session directory")?;
        }

        let mut line = serde_json::to_string(message).context("failed to serialize message")?;
        line.push('\n');

        tokio::task::spawn_blocking(move || append_with_lock(&path, &line))
            .await
            .context("append task panicked")??;
        Ok(())
    }

    /// The last `n` messages, oldest first (for the history prompt).
    pub async fn last_n(&self, user_id: &UserId, session_id: &SessionId, n: usize) -> Result<Vec<Message>> {
        let messages = self.read_all(user_id, session_id).await?;
        let start = messages.len().saturating_sub(n);
        Ok(messages[start..].to_vec())
    }

    /// The most recent assistant message that carries metadata, scanning backward through a
    /// bounded window (spec §4.9: "scanning the session's most recent assistant messages
    /// (bounded history, e.g. 10)").
    pub async fn most_recent_assistant_metadata(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        window: usize,
    ) -> Result<Option<Message>> {
        let messages = self.read_all(user_id, session_id).await?;
        let start = messages.len().saturating_sub(window);
        Ok(messages[start..]
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::model::Role::Assistant) && m.metadata.is_some())
            .cloned())
    }

    async fn read_all(&self, user_id: &UserId, session_id: &SessionId) -> Result<Vec<Message>> {
        let path = self.path_for(user_id, session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path).await.context("failed to read session log")?;
        let mut messages = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(msg) => messages.push(msg),
                Err(_) => continue, // tolerate a partially-written trailing line
            }
        }
        Ok(messages)
    }

    /// Clear a session's log entirely (used by tests and explicit session resets).
    pub async fn clear(&self, user_id: &UserId, session_id: &SessionId) -> Result<()> {
        let path = self.path_for(user_id, session_id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

fn append_with_lock(path: &Path, line: &str) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.read(true).write(true).create(true);
    #[cfg(unix)]
    {
        options.append(true);
        options.mode(0o600);
    }
    let mut file = options.open(path).context("failed to open session log")?;

    #[cfg(unix)]
    {
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms)?;
    }

    for attempt in 0..MAX_RETRIES {
        #[cfg(unix)]
        {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    file.seek(SeekFrom::End(0))?;
                    file.write_all(line.as_bytes())?;
                    file.flush()?;
                    let _ = FileExt::unlock(&file);
                    return Ok(());
                }
                Err(_) if attempt + 1 < MAX_RETRIES => {
                    std::thread::sleep(RETRY_SLEEP);
                    continue;
                }
                Err(e) => return Err(e).context("failed to acquire exclusive lock on session log"),
            }
        }
        #[cfg(not(unix))]
        {
            file.seek(SeekFrom::End(0))?;
            file.write_all(line.as_bytes())?;
            file.flush()?;
            return Ok(());
        }
    }
    anyhow::bail!("exhausted retries acquiring session log lock")
}
