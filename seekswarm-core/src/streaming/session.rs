//! Streaming session record and its state machine

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::torrent::InfoHash;

/// Unique identifier of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a streaming session.
///
/// `Initializing -> Ready -> Streaming <-> Paused`, with `Error` reachable
/// from any live state and `Destroyed` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Ready,
    Streaming,
    Paused,
    Error,
    Destroyed,
}

impl SessionStatus {
    /// Only `Destroyed` is terminal.
    pub fn is_terminal(self) -> bool {
        self == SessionStatus::Destroyed
    }

    /// Checks whether a session may move from `self` to `next`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Destroyed) | (_, Error) => true,
            (Initializing, Ready) => true,
            (Ready, Streaming) => true,
            (Streaming, Paused) | (Paused, Streaming) => true,
            _ => false,
        }
    }

    /// Whether the engine may still receive work for this session.
    pub fn accepts_engine_work(self) -> bool {
        !matches!(self, SessionStatus::Error | SessionStatus::Destroyed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Ready => "ready",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Paused => "paused",
            SessionStatus::Error => "error",
            SessionStatus::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// One client's in-progress interest in one file of one torrent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingSession {
    pub id: SessionId,
    pub torrent_id: String,
    pub info_hash: InfoHash,
    pub file_path: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Most recent engine failure, kept for diagnostics until destroyed
    pub last_error: Option<String>,
    /// Total pieces prioritized over the session's lifetime
    pub pieces_requested: u64,
}

impl StreamingSession {
    pub(super) fn new(
        torrent_id: String,
        info_hash: InfoHash,
        file_path: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            torrent_id,
            info_hash,
            file_path,
            status: SessionStatus::Initializing,
            created_at: now,
            last_activity: now,
            last_error: None,
            pieces_requested: 0,
        }
    }

    /// Refreshes the last-activity timestamp.
    pub(super) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Checks whether the session has been idle for longer than `timeout`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        (now - self.last_activity)
            .to_std()
            .map(|idle| idle > timeout)
            .unwrap_or(false)
    }
}
