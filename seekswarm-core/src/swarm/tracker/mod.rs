//! Tracker scrape primitives.
//!
//! A scrape asks a tracker for seeder/leecher counts without joining the
//! swarm. HTTP trackers follow BEP 48, UDP trackers BEP 15; the
//! [`SchemeScraper`] picks one by URL scheme so the reconciler can treat
//! every endpoint the same way.

pub mod http;
pub mod udp;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpScraper;
pub use udp::UdpScraper;

use crate::config::SwarmConfig;
use crate::torrent::InfoHash;

/// Counts returned by a single tracker for a single torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeCounts {
    /// Peers holding the complete torrent
    pub seeders: u32,
    /// Peers still downloading
    pub leechers: u32,
    /// Completed downloads ever reported, when the tracker shares it
    pub completed: Option<u32>,
}

/// Errors from querying one tracker endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Tracker {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Could not reach tracker {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Tracker {endpoint} returned HTTP status {status}")]
    Http { endpoint: String, status: u16 },

    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("Tracker {endpoint} refused the request: {reason}")]
    TrackerFailure { endpoint: String, reason: String },

    #[error("Unsupported tracker scheme {scheme:?} in {endpoint}")]
    UnsupportedScheme { endpoint: String, scheme: String },

    #[error("Invalid tracker URL {endpoint}: {reason}")]
    InvalidUrl { endpoint: String, reason: String },

    #[error("Socket error talking to {endpoint}: {reason}")]
    Io { endpoint: String, reason: String },
}

impl TrackerError {
    /// Endpoint the error originated from.
    pub fn endpoint(&self) -> &str {
        match self {
            TrackerError::Timeout { endpoint, .. }
            | TrackerError::Connection { endpoint, .. }
            | TrackerError::Http { endpoint, .. }
            | TrackerError::Malformed { endpoint, .. }
            | TrackerError::TrackerFailure { endpoint, .. }
            | TrackerError::UnsupportedScheme { endpoint, .. }
            | TrackerError::InvalidUrl { endpoint, .. }
            | TrackerError::Io { endpoint, .. } => endpoint,
        }
    }
}

/// Queries one tracker endpoint for the counts of one torrent.
///
/// Implementations must give up within `timeout`; the reconciler also
/// enforces it from the outside.
#[async_trait]
pub trait TrackerScraper: Send + Sync {
    /// Scrapes `endpoint` (an announce URL) for `info_hash`.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Timeout` - No answer within `timeout`
    /// - `TrackerError::Connection` - Network failure
    /// - `TrackerError::Malformed` - Response could not be decoded
    /// - `TrackerError::TrackerFailure` - Tracker answered with an error message
    async fn scrape(
        &self,
        endpoint: &str,
        info_hash: InfoHash,
        timeout: Duration,
    ) -> Result<ScrapeCounts, TrackerError>;
}

/// Dispatches scrapes to the HTTP or UDP implementation by URL scheme.
pub struct SchemeScraper {
    http: HttpScraper,
    udp: UdpScraper,
}

impl SchemeScraper {
    /// Creates a dispatcher using `config` for the HTTP client.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Connection` - HTTP client could not be built
    pub fn new(config: &SwarmConfig) -> Result<Self, TrackerError> {
        Ok(Self {
            http: HttpScraper::new(config)?,
            udp: UdpScraper::new(),
        })
    }
}

#[async_trait]
impl TrackerScraper for SchemeScraper {
    async fn scrape(
        &self,
        endpoint: &str,
        info_hash: InfoHash,
        timeout: Duration,
    ) -> Result<ScrapeCounts, TrackerError> {
        let url = url::Url::parse(endpoint).map_err(|e| TrackerError::InvalidUrl {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => self.http.scrape(endpoint, info_hash, timeout).await,
            "udp" => self.udp.scrape(endpoint, info_hash, timeout).await,
            other => Err(TrackerError::UnsupportedScheme {
                endpoint: endpoint.to_string(),
                scheme: other.to_string(),
            }),
        }
    }
}
