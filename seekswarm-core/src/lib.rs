//! Seekswarm Core - Seekable streams and trustworthy swarm health over BitTorrent
//!
//! This crate turns an opaque swarm into a prioritizable byte stream for a
//! single file inside a multi-file torrent, and keeps seeder/leecher counts
//! stable despite disagreeing trackers. The download engine itself is an
//! external collaborator reached through [`engine::StreamingEngine`].

pub mod config;
pub mod engine;
pub mod streaming;
pub mod swarm;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::SeekswarmConfig;
pub use engine::{EngineError, StreamingEngine};
pub use streaming::{SessionStore, StreamCoordinator, StreamingError};
pub use swarm::{StoreError, SwarmHealthReconciler, TrackerError};
pub use torrent::{InfoHash, MappingError, PieceRange, map_range};

/// Errors that can bubble up from any Seekswarm subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SeekswarmError {
    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Piece mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Swarm record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeekswarmError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SeekswarmError::Streaming(e) => match e {
                StreamingError::Validation(reason) => format!("Invalid request: {reason}"),
                StreamingError::SessionNotFound { .. } => {
                    "Stream session expired or does not exist".to_string()
                }
                StreamingError::FileNotFound { path } => {
                    format!("File {path} is not part of this torrent")
                }
                StreamingError::OffsetOutOfBounds { .. } => {
                    "Requested position is past the end of the file".to_string()
                }
                StreamingError::EngineFailure { .. } => {
                    "Torrent engine could not serve this stream".to_string()
                }
                _ => "Streaming error occurred".to_string(),
            },
            SeekswarmError::Mapping(MappingError::InvalidArgument { reason }) => {
                format!("Invalid byte range: {reason}")
            }
            SeekswarmError::Tracker(e) => {
                format!("Could not query tracker {}", e.endpoint())
            }
            SeekswarmError::Store(_) => "Swarm health storage error occurred".to_string(),
            SeekswarmError::Engine(EngineError::TorrentNotFound { info_hash }) => {
                format!("Torrent {info_hash} not found")
            }
            SeekswarmError::Engine(_) => "Torrent engine error occurred".to_string(),
            SeekswarmError::Configuration { reason } => format!("Configuration error: {reason}"),
            SeekswarmError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SeekswarmError::Configuration { .. }
                | SeekswarmError::Mapping(_)
                | SeekswarmError::Streaming(
                    StreamingError::Validation(_)
                        | StreamingError::Mapping(_)
                        | StreamingError::InvalidRange { .. }
                        | StreamingError::FileNotFound { .. }
                        | StreamingError::OffsetOutOfBounds { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, SeekswarmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::ValidationError;

    #[test]
    fn test_user_errors_are_classified() {
        let error: SeekswarmError = StreamingError::from(ValidationError::MissingField {
            field: "file_path",
        })
        .into();
        assert!(error.is_user_error());
        assert_eq!(
            error.user_message(),
            "Invalid request: Missing required field: file_path"
        );

        let error: SeekswarmError = EngineError::Unavailable {
            reason: "shutting down".to_string(),
        }
        .into();
        assert!(!error.is_user_error());
        assert_eq!(error.user_message(), "Torrent engine error occurred");
    }
}
