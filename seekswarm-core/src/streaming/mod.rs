//! Seekable streaming sessions over torrent files.
//!
//! A session records one client's interest in one file. The
//! [`SessionStore`] owns the session table and forwards piece priorities to
//! the engine; the [`StreamCoordinator`] turns "read file F at offset O"
//! requests into sessions plus piece ranges; [`spawn_session_sweeper`]
//! reclaims sessions whose clients went away without saying so.

pub mod coordinator;
pub mod session;
pub mod session_store;
pub mod sweeper;
pub mod validation;

pub use coordinator::{StreamCoordinator, StreamRequest, StreamTicket};
pub use session::{SessionId, SessionStatus, StreamingSession};
pub use session_store::{PrioritizeOutcome, SessionStats, SessionStore};
pub use sweeper::spawn_session_sweeper;
pub use validation::{ValidationError, validate_request};

use crate::engine::EngineError;
use crate::torrent::MappingError;

/// Streaming service errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Piece mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("Streaming session {session_id} not found")]
    SessionNotFound { session_id: SessionId },

    #[error("Invalid piece range: end {end_piece} is before start {start_piece}")]
    InvalidRange { start_piece: u64, end_piece: u64 },

    #[error("Session {session_id} cannot move from {from} to {to}")]
    InvalidTransition {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("File {path} not found in torrent")]
    FileNotFound { path: String },

    #[error("Offset {offset} is past the end of a {file_length}-byte file")]
    OffsetOutOfBounds { offset: u64, file_length: u64 },

    #[error("Engine failure: {source}")]
    EngineFailure {
        session_id: Option<SessionId>,
        #[source]
        source: EngineError,
    },
}
