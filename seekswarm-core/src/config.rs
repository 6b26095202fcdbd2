//! Centralized configuration for Seekswarm.
//!
//! All tunable parameters live here so timeouts and limits are not
//! scattered as literals across the streaming and swarm subsystems.

use std::time::Duration;

/// Central configuration for all Seekswarm components.
///
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SeekswarmConfig {
    pub streaming: StreamingConfig,
    pub swarm: SwarmConfig,
}

/// Streaming session lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Idle time after which a session is considered abandoned
    pub session_timeout: Duration,
    /// How often the background sweeper looks for abandoned sessions
    pub sweep_interval: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Tracker querying and swarm health configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmConfig {
    /// Per-endpoint scrape timeout
    pub tracker_timeout: Duration,
    /// Maximum number of trackers queried at once
    pub max_tracker_concurrency: usize,
    /// Trackers queried in addition to those announced by the torrent
    pub fallback_trackers: Vec<String>,
    /// User agent for HTTP scrape requests
    pub user_agent: &'static str,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            tracker_timeout: Duration::from_secs(5),
            max_tracker_concurrency: 5,
            fallback_trackers: [
                "udp://tracker.opentrackr.org:1337/announce",
                "udp://open.stealth.si:80/announce",
                "udp://tracker.torrent.eu.org:451/announce",
                "udp://exodus.desync.com:6969/announce",
                "http://tracker.opentrackr.org:1337/announce",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            user_agent: "seekswarm/0.1.0",
        }
    }
}

impl SeekswarmConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seconds) = env_u64("SEEKSWARM_SESSION_TIMEOUT") {
            config.streaming.session_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_u64("SEEKSWARM_SWEEP_INTERVAL") {
            if seconds > 0 {
                config.streaming.sweep_interval = Duration::from_secs(seconds);
            }
        }

        if let Some(seconds) = env_u64("SEEKSWARM_TRACKER_TIMEOUT") {
            if seconds > 0 {
                config.swarm.tracker_timeout = Duration::from_secs(seconds);
            }
        }

        if let Some(count) = env_u64("SEEKSWARM_MAX_TRACKER_CONCURRENCY") {
            if count > 0 {
                config.swarm.max_tracker_concurrency = count as usize;
            }
        }

        // Comma separated; an empty value disables the fallback list
        if let Ok(trackers) = std::env::var("SEEKSWARM_FALLBACK_TRACKERS") {
            config.swarm.fallback_trackers = trackers
                .split(',')
                .map(str::trim)
                .filter(|tracker| !tracker.is_empty())
                .map(String::from)
                .collect();
        }

        config
    }

    /// Creates a configuration for tests: short timeouts, no fallback trackers.
    pub fn for_testing() -> Self {
        Self {
            streaming: StreamingConfig {
                session_timeout: Duration::from_millis(200),
                sweep_interval: Duration::from_millis(50),
            },
            swarm: SwarmConfig {
                tracker_timeout: Duration::from_millis(200),
                max_tracker_concurrency: 4,
                fallback_trackers: Vec::new(),
                ..SwarmConfig::default()
            },
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}
