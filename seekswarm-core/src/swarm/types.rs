//! Swarm health data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tracker::{ScrapeCounts, TrackerError};
use crate::torrent::InfoHash;

/// Torrent whose swarm health should be refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmTarget {
    pub info_hash: InfoHash,
    /// Trackers announced by the torrent itself
    pub trackers: Vec<String>,
}

impl SwarmTarget {
    pub fn new(info_hash: InfoHash, trackers: Vec<String>) -> Self {
        Self {
            info_hash,
            trackers,
        }
    }
}

/// One endpoint's answer during a refresh pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmSample {
    pub endpoint: String,
    pub seeders: u32,
    pub leechers: u32,
}

impl SwarmSample {
    pub fn from_counts(endpoint: impl Into<String>, counts: ScrapeCounts) -> Self {
        Self {
            endpoint: endpoint.into(),
            seeders: counts.seeders,
            leechers: counts.leechers,
        }
    }
}

/// Result of querying a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    Success(SwarmSample),
    Failure {
        endpoint: String,
        error: TrackerError,
    },
}

impl EndpointOutcome {
    pub fn endpoint(&self) -> &str {
        match self {
            EndpointOutcome::Success(sample) => &sample.endpoint,
            EndpointOutcome::Failure { endpoint, .. } => endpoint,
        }
    }

    pub fn sample(&self) -> Option<&SwarmSample> {
        match self {
            EndpointOutcome::Success(sample) => Some(sample),
            EndpointOutcome::Failure { .. } => None,
        }
    }
}

/// Per-metric maximum over the endpoints that answered in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreshReading {
    pub seeders: u32,
    pub leechers: u32,
}

/// Best-known counts for a torrent, as persisted between passes.
///
/// Counts only ever grow: a lower reading never replaces a higher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmHealthRecord {
    pub seeders: u32,
    pub leechers: u32,
    pub fetched_at: DateTime<Utc>,
}

impl SwarmHealthRecord {
    /// Checks whether `fresh` beats this record on at least one metric.
    pub fn is_improved_by(&self, fresh: &FreshReading) -> bool {
        fresh.seeders > self.seeders || fresh.leechers > self.leechers
    }

    /// Merges a fresh reading into `stored` by per-metric maximum.
    ///
    /// Returns the merged record and whether it should be written back,
    /// which is only when some fresh value is strictly greater than the
    /// stored one. An absent stored record compares as zero; with neither
    /// side present there is nothing to report.
    pub fn merge(
        stored: Option<&SwarmHealthRecord>,
        fresh: Option<FreshReading>,
        now: DateTime<Utc>,
    ) -> (Option<SwarmHealthRecord>, bool) {
        match (stored, fresh) {
            (None, None) => (None, false),
            (Some(stored), None) => (Some(*stored), false),
            (None, Some(fresh)) => (
                Some(SwarmHealthRecord {
                    seeders: fresh.seeders,
                    leechers: fresh.leechers,
                    fetched_at: now,
                }),
                fresh.seeders > 0 || fresh.leechers > 0,
            ),
            (Some(stored), Some(fresh)) if stored.is_improved_by(&fresh) => (
                Some(SwarmHealthRecord {
                    seeders: stored.seeders.max(fresh.seeders),
                    leechers: stored.leechers.max(fresh.leechers),
                    fetched_at: now,
                }),
                true,
            ),
            (Some(stored), Some(_)) => (Some(*stored), false),
        }
    }
}

/// What happened to the stored record during a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistenceOutcome {
    /// No fresh value beat the stored one
    Unchanged,
    /// Improved record was written
    Written,
    /// Improved record could not be written; returned counts are still accurate
    WriteFailed { reason: String },
    /// Stored record could not be read, so an apparent improvement was not written
    SkippedUnreadable,
}

/// Result of one refresh pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmStats {
    pub info_hash: InfoHash,
    /// `None` when nothing is known, as opposed to an empty swarm
    pub seeders: Option<u32>,
    pub leechers: Option<u32>,
    pub fetched_at: DateTime<Utc>,
    pub endpoints_queried: usize,
    pub endpoints_responded: usize,
    pub persistence: PersistenceOutcome,
    /// Set when the stored record could not be read and was treated as absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}
