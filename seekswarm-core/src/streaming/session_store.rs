//! Concurrent table of active streaming sessions

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::StreamingError;
use super::session::{SessionId, SessionStatus, StreamingSession};
use super::validation::{ValidationError, validate_request};
use crate::config::StreamingConfig;
use crate::engine::{PiecePriority, PriorityRequest, StreamingEngine};
use crate::torrent::InfoHash;

/// Result of a successful prioritization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrioritizeOutcome {
    pub session_id: SessionId,
    pub prioritized_count: u64,
}

/// Snapshot of session counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub initializing: usize,
    pub ready: usize,
    pub streaming: usize,
    pub paused: usize,
    pub errored: usize,
}

/// Owns every live streaming session.
///
/// Cloning yields another handle onto the same table. Mutations take the
/// write lock; engine calls happen with the lock released and their results
/// are applied only if the session still exists.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, StreamingSession>>>,
    engine: Arc<dyn StreamingEngine>,
    config: StreamingConfig,
}

impl SessionStore {
    /// Creates an empty store backed by `engine`.
    pub fn new(engine: Arc<dyn StreamingEngine>, config: StreamingConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            engine,
            config,
        }
    }

    /// Returns the configuration the store was built with.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Validates a request without touching any state.
    ///
    /// # Errors
    ///
    /// - `ValidationError::MissingField` - Empty identifier or path
    /// - `ValidationError::InvalidPath` - Traversal segment or NUL byte
    pub fn validate_request(torrent_id: &str, file_path: &str) -> Result<(), ValidationError> {
        validate_request(torrent_id, file_path)
    }

    /// Allocates a new session in `Initializing`.
    ///
    /// Identical arguments always produce distinct sessions.
    ///
    /// # Errors
    ///
    /// - `StreamingError::Validation` - Request failed validation or the info hash is malformed
    pub async fn create_session(
        &self,
        torrent_id: &str,
        file_path: &str,
        info_hash: &str,
    ) -> Result<StreamingSession, StreamingError> {
        validate_request(torrent_id, file_path)?;
        let info_hash =
            InfoHash::parse(info_hash).map_err(|source| ValidationError::InvalidInfohash {
                value: info_hash.to_string(),
                source,
            })?;

        let session = StreamingSession::new(
            torrent_id.to_string(),
            info_hash,
            file_path.to_string(),
            Utc::now(),
        );

        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());

        info!(
            "Created streaming session {} for {} in {}",
            session.id, session.file_path, session.info_hash
        );

        Ok(session)
    }

    /// Looks up a session without mutating it.
    pub async fn session(&self, session_id: SessionId) -> Option<StreamingSession> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Returns every live session.
    pub async fn list_sessions(&self) -> Vec<StreamingSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Counts sessions by status.
    pub async fn stats(&self) -> SessionStats {
        let sessions = self.sessions.read().await;
        let mut stats = SessionStats {
            active_sessions: sessions.len(),
            ..SessionStats::default()
        };
        for session in sessions.values() {
            match session.status {
                SessionStatus::Initializing => stats.initializing += 1,
                SessionStatus::Ready => stats.ready += 1,
                SessionStatus::Streaming => stats.streaming += 1,
                SessionStatus::Paused => stats.paused += 1,
                SessionStatus::Error => stats.errored += 1,
                SessionStatus::Destroyed => {}
            }
        }
        stats
    }

    /// Destroys a session and releases its engine resources.
    ///
    /// Unknown or already destroyed identifiers are ignored. The engine
    /// release completes before this returns.
    pub async fn destroy_session(&self, session_id: SessionId) {
        self.destroy_where(session_id, |_| true).await;
    }

    /// Destroys every session idle for longer than the configured timeout.
    ///
    /// Returns how many sessions were removed.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.session_timeout;
        let candidates: Vec<SessionId> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.is_stale(now, timeout))
            .map(|session| session.id)
            .collect();

        let mut removed = 0;
        for session_id in candidates {
            // Re-checked under the write lock: activity may have landed meanwhile
            if self
                .destroy_where(session_id, |session| session.is_stale(now, timeout))
                .await
            {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Swept {} stale streaming sessions", removed);
        }
        removed
    }

    /// Forwards an inclusive piece range to the engine for a session.
    ///
    /// # Errors
    ///
    /// - `StreamingError::InvalidRange` - `end_piece < start_piece`
    /// - `StreamingError::SessionNotFound` - Unknown or concurrently destroyed session
    /// - `StreamingError::InvalidTransition` - Session already failed
    /// - `StreamingError::EngineFailure` - Engine rejected the instruction; session moved to `Error`
    pub async fn prioritize_pieces(
        &self,
        session_id: SessionId,
        start_piece: u64,
        end_piece: u64,
        priority: PiecePriority,
    ) -> Result<PrioritizeOutcome, StreamingError> {
        if end_piece < start_piece {
            return Err(StreamingError::InvalidRange {
                start_piece,
                end_piece,
            });
        }

        let info_hash = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(&session_id)
                .ok_or(StreamingError::SessionNotFound { session_id })?;
            if !session.status.accepts_engine_work() {
                return Err(StreamingError::InvalidTransition {
                    session_id,
                    from: session.status,
                    to: SessionStatus::Streaming,
                });
            }
            session.info_hash
        };

        let request = PriorityRequest {
            session_id,
            info_hash,
            start_piece,
            end_piece,
            priority,
        };
        let result = self.engine.prioritize_pieces(request).await;
        let prioritized_count = end_piece - start_piece + 1;

        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session_id) {
            drop(sessions);
            if result.is_ok() {
                // Destroyed while the engine call was in flight; undo the subscription
                debug!(
                    "Session {} vanished during prioritization, releasing again",
                    session_id
                );
                self.release_engine_resources(session_id, info_hash).await;
            }
            return Err(StreamingError::SessionNotFound { session_id });
        }
        let Some(session) = sessions.get_mut(&session_id) else {
            return Err(StreamingError::SessionNotFound { session_id });
        };

        match result {
            Ok(()) => {
                session.touch(Utc::now());
                session.pieces_requested += prioritized_count;
                if session.status == SessionStatus::Ready {
                    session.status = SessionStatus::Streaming;
                }
                debug!(
                    "Prioritized pieces {}..={} ({}) for session {}",
                    start_piece, end_piece, priority, session_id
                );
                Ok(PrioritizeOutcome {
                    session_id,
                    prioritized_count,
                })
            }
            Err(source) => {
                warn!(
                    "Engine rejected prioritization for session {}: {}",
                    session_id, source
                );
                session.status = SessionStatus::Error;
                session.last_error = Some(source.to_string());
                Err(StreamingError::EngineFailure {
                    session_id: Some(session_id),
                    source,
                })
            }
        }
    }

    /// Moves `Initializing -> Ready`.
    ///
    /// # Errors
    ///
    /// - `StreamingError::SessionNotFound` - Unknown session
    /// - `StreamingError::InvalidTransition` - Session is not initializing
    pub async fn mark_ready(&self, session_id: SessionId) -> Result<StreamingSession, StreamingError> {
        self.transition(session_id, SessionStatus::Initializing, SessionStatus::Ready)
            .await
    }

    /// Moves `Ready -> Streaming`.
    ///
    /// # Errors
    ///
    /// - `StreamingError::SessionNotFound` - Unknown session
    /// - `StreamingError::InvalidTransition` - Session is not ready
    pub async fn mark_streaming(
        &self,
        session_id: SessionId,
    ) -> Result<StreamingSession, StreamingError> {
        self.transition(session_id, SessionStatus::Ready, SessionStatus::Streaming)
            .await
    }

    /// Moves `Streaming -> Paused`.
    ///
    /// # Errors
    ///
    /// - `StreamingError::SessionNotFound` - Unknown session
    /// - `StreamingError::InvalidTransition` - Session is not streaming
    pub async fn pause(&self, session_id: SessionId) -> Result<StreamingSession, StreamingError> {
        self.transition(session_id, SessionStatus::Streaming, SessionStatus::Paused)
            .await
    }

    /// Moves `Paused -> Streaming`.
    ///
    /// # Errors
    ///
    /// - `StreamingError::SessionNotFound` - Unknown session
    /// - `StreamingError::InvalidTransition` - Session is not paused
    pub async fn resume(&self, session_id: SessionId) -> Result<StreamingSession, StreamingError> {
        self.transition(session_id, SessionStatus::Paused, SessionStatus::Streaming)
            .await
    }

    /// Moves a live session to `Error`, keeping it inspectable until destroyed.
    ///
    /// # Errors
    ///
    /// - `StreamingError::SessionNotFound` - Unknown session
    pub async fn record_engine_failure(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<StreamingSession, StreamingError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(StreamingError::SessionNotFound { session_id })?;
        session.status = SessionStatus::Error;
        session.last_error = Some(reason.to_string());
        warn!("Session {} moved to error: {}", session_id, reason);
        Ok(session.clone())
    }

    /// Refreshes a session's activity timestamp.
    ///
    /// # Errors
    ///
    /// - `StreamingError::SessionNotFound` - Unknown session
    pub async fn touch(&self, session_id: SessionId) -> Result<(), StreamingError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(StreamingError::SessionNotFound { session_id })?;
        session.touch(Utc::now());
        Ok(())
    }

    async fn transition(
        &self,
        session_id: SessionId,
        from: SessionStatus,
        next: SessionStatus,
    ) -> Result<StreamingSession, StreamingError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(StreamingError::SessionNotFound { session_id })?;

        if session.status != from || !session.status.can_transition_to(next) {
            return Err(StreamingError::InvalidTransition {
                session_id,
                from: session.status,
                to: next,
            });
        }

        debug!("Session {}: {} -> {}", session_id, session.status, next);
        session.status = next;
        session.touch(Utc::now());
        Ok(session.clone())
    }

    /// Single removal path shared by explicit destroys and the sweep.
    async fn destroy_where<F>(&self, session_id: SessionId, predicate: F) -> bool
    where
        F: FnOnce(&StreamingSession) -> bool,
    {
        let removed = {
            let mut sessions = self.sessions.write().await;
            if sessions.get(&session_id).is_some_and(predicate) {
                sessions.remove(&session_id)
            } else {
                None
            }
        };

        let Some(mut session) = removed else {
            debug!("Destroy ignored for unknown session {}", session_id);
            return false;
        };

        session.status = SessionStatus::Destroyed;
        self.release_engine_resources(session.id, session.info_hash)
            .await;
        info!(
            "Destroyed streaming session {} ({})",
            session.id, session.file_path
        );
        true
    }

    async fn release_engine_resources(&self, session_id: SessionId, info_hash: InfoHash) {
        if let Err(e) = self.engine.release_session(session_id, info_hash).await {
            warn!(
                "Failed to release engine resources for session {}: {}",
                session_id, e
            );
        }
    }
}
