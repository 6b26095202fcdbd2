//! Torrent engine abstraction consumed by the streaming layer
//!
//! The engine owns peer connections, piece verification and disk I/O. This
//! crate only tells it which pieces matter and when a session's resources can
//! go away, so the seam is a narrow async trait.

pub mod test_mocks;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use test_mocks::MockEngine;

use crate::streaming::SessionId;
use crate::torrent::{InfoHash, TorrentDescriptor};

/// Download priority tier forwarded to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PiecePriority {
    /// Pieces needed right now for playback
    High,
    /// Pieces needed soon
    Normal,
    /// Background prefetch
    Low,
}

impl std::fmt::Display for PiecePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PiecePriority::High => write!(f, "high"),
            PiecePriority::Normal => write!(f, "normal"),
            PiecePriority::Low => write!(f, "low"),
        }
    }
}

/// Piece-priority instruction for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityRequest {
    /// Session the pieces are requested for
    pub session_id: SessionId,
    /// Torrent holding the pieces
    pub info_hash: InfoHash,
    /// First piece to prioritize
    pub start_piece: u64,
    /// Last piece to prioritize (inclusive)
    pub end_piece: u64,
    /// Priority tier
    pub priority: PiecePriority,
}

/// Failures reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Torrent {info_hash} not known to engine")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("Engine unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },
}

/// Operations the streaming layer needs from a torrent engine.
///
/// Implementations must be safe to call from many request tasks at once.
#[async_trait]
pub trait StreamingEngine: Send + Sync {
    /// Returns the layout of a torrent the engine knows about.
    ///
    /// # Errors
    ///
    /// - `EngineError::TorrentNotFound` - Engine has no metadata for the torrent
    async fn torrent_descriptor(&self, info_hash: InfoHash)
    -> Result<TorrentDescriptor, EngineError>;

    /// Raises the download priority of an inclusive piece range.
    ///
    /// # Errors
    ///
    /// - `EngineError::Unavailable` - Engine could not accept the instruction
    async fn prioritize_pieces(&self, request: PriorityRequest) -> Result<(), EngineError>;

    /// Releases buffers and piece subscriptions tied to a session.
    ///
    /// # Errors
    ///
    /// - `EngineError::Unavailable` - Engine could not release the resources
    async fn release_session(
        &self,
        session_id: SessionId,
        info_hash: InfoHash,
    ) -> Result<(), EngineError>;

    /// Reads bytes from one file once its pieces are available.
    ///
    /// # Errors
    ///
    /// - `EngineError::ReadFailed` - Pieces missing or storage failure
    async fn read_file_range(
        &self,
        info_hash: InfoHash,
        file_path: &str,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, EngineError>;
}
