//! Entry point for "stream file F of torrent T from offset O" requests

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::session::{SessionId, SessionStatus, StreamingSession};
use super::session_store::SessionStore;
use super::validation::{ValidationError, validate_request};
use super::StreamingError;
use crate::engine::{PiecePriority, StreamingEngine};
use crate::torrent::{FileSpan, InfoHash, PieceRange, map_range};

/// Inbound request to begin or continue streaming a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Caller-side identifier of the torrent (catalog id)
    pub torrent_id: String,
    /// Hex or base-32 info hash
    pub info_hash: String,
    /// Path of the file inside the torrent
    pub file_path: String,
    /// Byte offset inside the file
    pub offset: u64,
    /// Number of bytes wanted; clamped to the end of the file
    pub length: u64,
    /// Session to continue, if the client already has one
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

/// What the caller needs to serve the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamTicket {
    pub session_id: SessionId,
    pub reused_session: bool,
    pub file_span: FileSpan,
    pub piece_range: PieceRange,
    pub prioritized_count: u64,
    /// Bytes that will be served after clamping to the file end
    pub served_length: u64,
}

/// Couples the session store with descriptor lookups and piece mapping.
#[derive(Clone)]
pub struct StreamCoordinator {
    sessions: SessionStore,
    engine: Arc<dyn StreamingEngine>,
}

impl StreamCoordinator {
    /// Creates a coordinator; `sessions` should be backed by the same engine.
    pub fn new(sessions: SessionStore, engine: Arc<dyn StreamingEngine>) -> Self {
        Self { sessions, engine }
    }

    /// Session table used by this coordinator.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Validates the request, obtains a session and prioritizes the pieces
    /// backing `[offset, offset + length)` of the file.
    ///
    /// # Errors
    ///
    /// - `StreamingError::Validation` - Bad identifier, path or info hash
    /// - `StreamingError::EngineFailure` - Engine has no descriptor or rejected the priorities
    /// - `StreamingError::FileNotFound` - Path is not part of the torrent
    /// - `StreamingError::OffsetOutOfBounds` - Offset lies past the file end
    /// - `StreamingError::Mapping` - Torrent reports a zero piece length
    pub async fn begin_stream(&self, request: StreamRequest) -> Result<StreamTicket, StreamingError> {
        validate_request(&request.torrent_id, &request.file_path)?;
        let info_hash = InfoHash::parse(&request.info_hash).map_err(|source| {
            ValidationError::InvalidInfohash {
                value: request.info_hash.clone(),
                source,
            }
        })?;

        let descriptor = self
            .engine
            .torrent_descriptor(info_hash)
            .await
            .map_err(|source| StreamingError::EngineFailure {
                session_id: None,
                source,
            })?;

        let file_span =
            descriptor
                .file(&request.file_path)
                .ok_or_else(|| StreamingError::FileNotFound {
                    path: request.file_path.clone(),
                })?;

        let past_end = if file_span.length == 0 {
            request.offset > 0
        } else {
            request.offset >= file_span.length
        };
        if past_end {
            return Err(StreamingError::OffsetOutOfBounds {
                offset: request.offset,
                file_length: file_span.length,
            });
        }
        let served_length = request.length.min(file_span.length - request.offset);

        let piece_range = map_range(
            file_span.offset + request.offset,
            served_length,
            descriptor.piece_length,
        )?;

        let (session, reused_session) = self.acquire_session(&request, info_hash).await?;
        if session.status == SessionStatus::Initializing {
            self.sessions.mark_ready(session.id).await?;
        }

        let outcome = self
            .sessions
            .prioritize_pieces(
                session.id,
                piece_range.start_piece,
                piece_range.end_piece,
                PiecePriority::High,
            )
            .await?;

        info!(
            "Streaming {} bytes of {} from offset {} via pieces {}..={}",
            served_length,
            request.file_path,
            request.offset,
            piece_range.start_piece,
            piece_range.end_piece
        );

        Ok(StreamTicket {
            session_id: session.id,
            reused_session,
            file_span,
            piece_range,
            prioritized_count: outcome.prioritized_count,
            served_length,
        })
    }

    /// Reads bytes of the session's file through the engine.
    ///
    /// # Errors
    ///
    /// - `StreamingError::SessionNotFound` - Unknown session
    /// - `StreamingError::InvalidTransition` - Session already failed
    /// - `StreamingError::EngineFailure` - Read failed; session moved to `Error`
    pub async fn read(
        &self,
        session_id: SessionId,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, StreamingError> {
        let session = self
            .sessions
            .session(session_id)
            .await
            .ok_or(StreamingError::SessionNotFound { session_id })?;
        if !session.status.accepts_engine_work() {
            return Err(StreamingError::InvalidTransition {
                session_id,
                from: session.status,
                to: SessionStatus::Streaming,
            });
        }

        match self
            .engine
            .read_file_range(session.info_hash, &session.file_path, offset, length)
            .await
        {
            Ok(data) => {
                self.sessions.touch(session_id).await?;
                Ok(data)
            }
            Err(source) => {
                self.sessions
                    .record_engine_failure(session_id, &source.to_string())
                    .await?;
                Err(StreamingError::EngineFailure {
                    session_id: Some(session_id),
                    source,
                })
            }
        }
    }

    /// Ends a stream and releases its resources. Unknown ids are ignored.
    pub async fn end_stream(&self, session_id: SessionId) {
        self.sessions.destroy_session(session_id).await;
    }

    async fn acquire_session(
        &self,
        request: &StreamRequest,
        info_hash: InfoHash,
    ) -> Result<(StreamingSession, bool), StreamingError> {
        if let Some(session_id) = request.session_id {
            match self.sessions.session(session_id).await {
                Some(existing)
                    if existing.info_hash == info_hash
                        && existing.file_path == request.file_path
                        && existing.status.accepts_engine_work() =>
                {
                    return Ok((existing, true));
                }
                _ => debug!(
                    "Session {} cannot be reused for {}, creating a new one",
                    session_id, request.file_path
                ),
            }
        }

        let session = self
            .sessions
            .create_session(&request.torrent_id, &request.file_path, &request.info_hash)
            .await?;
        Ok((session, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamingConfig;
    use crate::engine::MockEngine;
    use crate::torrent::test_data::{TEST_INFO_HASH_HEX, create_test_descriptor};

    fn create_coordinator() -> (StreamCoordinator, MockEngine) {
        let engine = MockEngine::with_descriptor(create_test_descriptor());
        let shared: Arc<dyn StreamingEngine> = Arc::new(engine.clone());
        let sessions = SessionStore::new(Arc::clone(&shared), StreamingConfig::default());
        (StreamCoordinator::new(sessions, shared), engine)
    }

    fn song_request(offset: u64, length: u64) -> StreamRequest {
        StreamRequest {
            torrent_id: "42".to_string(),
            info_hash: TEST_INFO_HASH_HEX.to_string(),
            file_path: "Music/Artist/song.mp3".to_string(),
            offset,
            length,
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_begin_stream_maps_file_window() {
        let (coordinator, engine) = create_coordinator();

        // Song starts at byte 500000 of the torrent
        let ticket = coordinator
            .begin_stream(song_request(0, 1_000_000))
            .await
            .unwrap();

        assert!(!ticket.reused_session);
        assert_eq!(ticket.file_span.offset, 500_000);
        assert_eq!(ticket.piece_range.start_piece, 1);
        assert_eq!(ticket.piece_range.end_piece, 5);
        assert_eq!(ticket.prioritized_count, 5);

        let requests = engine.priority_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].priority, PiecePriority::High);

        let session = coordinator
            .sessions()
            .session(ticket.session_id)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Streaming);
    }

    #[tokio::test]
    async fn test_length_clamped_to_file_end() {
        let (coordinator, _engine) = create_coordinator();

        let ticket = coordinator
            .begin_stream(song_request(999_000, 50_000))
            .await
            .unwrap();
        assert_eq!(ticket.served_length, 1_000);
        // Last byte of the song is absolute byte 1499999, piece 5
        assert_eq!(ticket.piece_range.end_piece, 5);
    }

    #[tokio::test]
    async fn test_session_reuse() {
        let (coordinator, _engine) = create_coordinator();
        let first = coordinator
            .begin_stream(song_request(0, 10))
            .await
            .unwrap();

        let mut seek = song_request(600_000, 10);
        seek.session_id = Some(first.session_id);
        let second = coordinator.begin_stream(seek).await.unwrap();

        assert!(second.reused_session);
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(coordinator.sessions().len().await, 1);
    }

    #[tokio::test]
    async fn test_rejections_create_no_session() {
        let (coordinator, engine) = create_coordinator();

        let mut traversal = song_request(0, 10);
        traversal.file_path = "../../etc/passwd".to_string();
        assert!(matches!(
            coordinator.begin_stream(traversal).await,
            Err(StreamingError::Validation(_))
        ));

        let mut missing = song_request(0, 10);
        missing.file_path = "Music/other.mp3".to_string();
        assert!(matches!(
            coordinator.begin_stream(missing).await,
            Err(StreamingError::FileNotFound { .. })
        ));

        assert!(matches!(
            coordinator.begin_stream(song_request(1_000_000, 1)).await,
            Err(StreamingError::OffsetOutOfBounds { .. })
        ));

        let mut unknown = song_request(0, 10);
        unknown.info_hash = "ff".repeat(20);
        assert!(matches!(
            coordinator.begin_stream(unknown).await,
            Err(StreamingError::EngineFailure {
                session_id: None,
                ..
            })
        ));

        assert!(coordinator.sessions().is_empty().await);
        assert!(engine.priority_requests().is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_is_recorded_on_session() {
        let (coordinator, engine) = create_coordinator();
        let ticket = coordinator
            .begin_stream(song_request(0, 10))
            .await
            .unwrap();

        let data = coordinator.read(ticket.session_id, 0, 4).await.unwrap();
        assert_eq!(data.as_ref(), &[0, 1, 2, 3]);

        engine.set_read_failure(true);
        let result = coordinator.read(ticket.session_id, 0, 4).await;
        assert!(matches!(
            result,
            Err(StreamingError::EngineFailure { .. })
        ));

        let session = coordinator
            .sessions()
            .session(ticket.session_id)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Error);

        coordinator.end_stream(ticket.session_id).await;
        assert_eq!(engine.released_sessions(), vec![ticket.session_id]);
    }
}
