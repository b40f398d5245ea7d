//! Browse Sessions
//!
//! Per-session gallery state. Each browser session owns its own selected
//! position; nothing is shared between sessions.

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Gallery state for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Session {
    pub selected_index: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self { selected_index: 0 }
    }
}

impl Session {
    /// Select `index`, clamped to `[0, len - 1]` (0 for an empty list)
    pub fn select(&mut self, index: usize, len: usize) -> usize {
        self.selected_index = clamp_index(index, len);
        self.selected_index
    }

    /// Re-clamp after the entry list was reloaded
    pub fn reload(&mut self, len: usize) -> usize {
        self.select(self.selected_index, len)
    }
}

pub fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

#[derive(Debug)]
struct Slot {
    session: Session,
    last_seen: Instant,
}

/// Sessions keyed by id, expired after a period of inactivity
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Slot>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Start a new session at position 0
    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        let timeout = self.idle_timeout;
        sessions.retain(|_, slot| slot.last_seen.elapsed() < timeout);
        sessions.insert(
            id,
            Slot {
                session: Session::default(),
                last_seen: Instant::now(),
            },
        );
        tracing::debug!(session_id = %id, active = sessions.len(), "Session created");
        id
    }

    /// Apply `f` to a live session; `None` if unknown or expired
    pub async fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions.get_mut(&id)?;

        if slot.last_seen.elapsed() >= self.idle_timeout {
            sessions.remove(&id);
            return None;
        }

        slot.last_seen = Instant::now();
        Some(f(&mut slot.session))
    }

    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.update(id, |s| *s).await
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600))
    }
}
