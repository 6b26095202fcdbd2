//! Monotonic swarm health reconciliation across unreliable trackers

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::store::SwarmRecordStore;
use super::tracker::{ScrapeCounts, TrackerError, TrackerScraper};
use super::types::{
    EndpointOutcome, FreshReading, PersistenceOutcome, SwarmHealthRecord, SwarmSample,
    SwarmStats, SwarmTarget,
};
use crate::config::SwarmConfig;
use crate::torrent::InfoHash;

/// Trims, drops empty entries and de-duplicates, keeping first occurrences.
///
/// Announced trackers come first so they are queried ahead of the fallbacks.
pub fn candidate_endpoints(announced: &[String], fallback: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    announced
        .iter()
        .chain(fallback)
        .map(|endpoint| endpoint.trim())
        .filter(|endpoint| !endpoint.is_empty())
        .filter(|endpoint| seen.insert(endpoint.to_string()))
        .map(String::from)
        .collect()
}

/// Per-metric maximum over successful samples, `None` when nobody answered.
pub fn fresh_reading(outcomes: &[EndpointOutcome]) -> Option<FreshReading> {
    outcomes
        .iter()
        .filter_map(EndpointOutcome::sample)
        .fold(None, |best: Option<FreshReading>, sample| {
            Some(match best {
                None => FreshReading {
                    seeders: sample.seeders,
                    leechers: sample.leechers,
                },
                Some(best) => FreshReading {
                    seeders: best.seeders.max(sample.seeders),
                    leechers: best.leechers.max(sample.leechers),
                },
            })
        })
}

/// Keeps seeder/leecher counts trustworthy despite disagreeing trackers.
///
/// Each [`refresh`](Self::refresh) queries every candidate tracker
/// concurrently, takes the per-metric maximum of the answers and merges it
/// with the stored record so counts never regress.
pub struct SwarmHealthReconciler {
    scraper: Arc<dyn TrackerScraper>,
    store: Arc<dyn SwarmRecordStore>,
    config: SwarmConfig,
}

impl SwarmHealthReconciler {
    pub fn new(
        scraper: Arc<dyn TrackerScraper>,
        store: Arc<dyn SwarmRecordStore>,
        config: SwarmConfig,
    ) -> Self {
        Self {
            scraper,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Runs one reconciliation pass for `target`.
    ///
    /// Never fails: unreachable trackers and store errors are folded into
    /// the returned [`SwarmStats`].
    pub async fn refresh(&self, target: &SwarmTarget) -> SwarmStats {
        let endpoints = candidate_endpoints(&target.trackers, &self.config.fallback_trackers);
        let endpoints_queried = endpoints.len();

        let outcomes = self.query_endpoints(target.info_hash, endpoints).await;
        let endpoints_responded = outcomes.iter().filter(|o| o.sample().is_some()).count();
        let fresh = fresh_reading(&outcomes);

        let (stored, load_error) = match self.store.load(&target.info_hash).await {
            Ok(stored) => (stored, None),
            Err(e) => {
                warn!(
                    "Could not load swarm record for {}, treating as absent: {}",
                    target.info_hash, e
                );
                (None, Some(e.to_string()))
            }
        };

        let now = Utc::now();
        let (merged, improved) = SwarmHealthRecord::merge(stored.as_ref(), fresh, now);

        let persistence = match merged {
            // Unreadable record may hold higher counts
            Some(_) if improved && load_error.is_some() => {
                warn!(
                    "Not saving swarm record for {}: stored record was unreadable",
                    target.info_hash
                );
                PersistenceOutcome::SkippedUnreadable
            }
            Some(record) if improved => match self.store.save(&target.info_hash, record).await {
                Ok(()) => PersistenceOutcome::Written,
                Err(e) => {
                    warn!(
                        "Could not save swarm record for {}: {}",
                        target.info_hash, e
                    );
                    PersistenceOutcome::WriteFailed {
                        reason: e.to_string(),
                    }
                }
            },
            _ => PersistenceOutcome::Unchanged,
        };

        info!(
            "Swarm refresh for {}: {}/{} trackers answered, seeders={:?} leechers={:?}",
            target.info_hash,
            endpoints_responded,
            endpoints_queried,
            merged.map(|r| r.seeders),
            merged.map(|r| r.leechers)
        );

        SwarmStats {
            info_hash: target.info_hash,
            seeders: merged.map(|r| r.seeders),
            leechers: merged.map(|r| r.leechers),
            fetched_at: now,
            endpoints_queried,
            endpoints_responded,
            persistence,
            load_error,
        }
    }

    /// Scrapes every endpoint, at most `max_tracker_concurrency` at a time.
    ///
    /// Each query is bounded by `tracker_timeout`; a hanging tracker turns
    /// into a `TrackerError::Timeout` outcome.
    pub async fn query_endpoints(
        &self,
        info_hash: InfoHash,
        endpoints: Vec<String>,
    ) -> Vec<EndpointOutcome> {
        let timeout = self.config.tracker_timeout;
        let concurrency = self.config.max_tracker_concurrency.max(1);
        let scraper = &self.scraper;

        stream::iter(endpoints)
            .map(|endpoint| async move {
                let outcome = query_one(scraper.as_ref(), &endpoint, info_hash, timeout).await;
                match outcome {
                    Ok(counts) => {
                        debug!(
                            "Tracker {} reported {} seeders, {} leechers",
                            endpoint, counts.seeders, counts.leechers
                        );
                        EndpointOutcome::Success(SwarmSample::from_counts(endpoint, counts))
                    }
                    Err(error) => {
                        debug!("Tracker {} dropped from this pass: {}", endpoint, error);
                        EndpointOutcome::Failure { endpoint, error }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }
}

async fn query_one(
    scraper: &dyn TrackerScraper,
    endpoint: &str,
    info_hash: InfoHash,
    timeout: Duration,
) -> Result<ScrapeCounts, TrackerError> {
    tokio::time::timeout(timeout, scraper.scrape(endpoint, info_hash, timeout))
        .await
        .map_err(|_| TrackerError::Timeout {
            endpoint: endpoint.to_string(),
            timeout,
        })?
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use proptest::prelude::*;

    use super::*;
    use crate::swarm::store::InMemorySwarmRecordStore;
    use crate::swarm::test_mocks::{FlakyRecordStore, MockResponse, MockScraper};
    use crate::torrent::test_data::create_test_info_hash;

    fn test_config() -> SwarmConfig {
        SwarmConfig {
            tracker_timeout: Duration::from_millis(100),
            max_tracker_concurrency: 5,
            fallback_trackers: Vec::new(),
            ..SwarmConfig::default()
        }
    }

    fn target(trackers: &[&str]) -> SwarmTarget {
        SwarmTarget::new(
            create_test_info_hash(),
            trackers.iter().map(|t| t.to_string()).collect(),
        )
    }

    fn sample(seeders: u32, leechers: u32) -> EndpointOutcome {
        EndpointOutcome::Success(SwarmSample {
            endpoint: format!("udp://t{seeders}-{leechers}:1"),
            seeders,
            leechers,
        })
    }

    #[test]
    fn test_candidate_endpoints_dedup_preserves_order() {
        let announced = vec![
            " udp://a:1/announce ".to_string(),
            "".to_string(),
            "http://b/announce".to_string(),
            "udp://a:1/announce".to_string(),
        ];
        let fallback = vec!["http://b/announce".to_string(), "udp://c:1".to_string()];

        assert_eq!(
            candidate_endpoints(&announced, &fallback),
            vec!["udp://a:1/announce", "http://b/announce", "udp://c:1"]
        );
    }

    #[test]
    fn test_fresh_reading_takes_max_per_metric() {
        let failure = EndpointOutcome::Failure {
            endpoint: "udp://dead:1".to_string(),
            error: TrackerError::Connection {
                endpoint: "udp://dead:1".to_string(),
                reason: "refused".to_string(),
            },
        };
        let outcomes = vec![sample(8, 2), failure.clone(), sample(12, 1)];

        assert_eq!(
            fresh_reading(&outcomes),
            Some(FreshReading {
                seeders: 12,
                leechers: 2
            })
        );
        assert_eq!(fresh_reading(&[failure]), None);
        assert_eq!(fresh_reading(&[]), None);
    }

    #[tokio::test]
    async fn test_refresh_merges_with_stored_record() {
        let scraper = MockScraper::new()
            .with_counts("udp://one:1/announce", 8, 2)
            .with_counts("udp://two:1/announce", 12, 1);
        let store = Arc::new(FlakyRecordStore::new());
        let info_hash = create_test_info_hash();
        store.insert(
            info_hash,
            SwarmHealthRecord {
                seeders: 10,
                leechers: 3,
                fetched_at: Utc::now(),
            },
        );

        let reconciler =
            SwarmHealthReconciler::new(Arc::new(scraper), store.clone(), test_config());
        let stats = reconciler
            .refresh(&target(&[
                "udp://one:1/announce",
                "udp://two:1/announce",
                "udp://dead:1/announce",
            ]))
            .await;

        assert_eq!(stats.seeders, Some(12));
        assert_eq!(stats.leechers, Some(3));
        assert_eq!(stats.endpoints_queried, 3);
        assert_eq!(stats.endpoints_responded, 2);
        assert_eq!(stats.persistence, PersistenceOutcome::Written);

        let stored = store.get(&info_hash).unwrap();
        assert_eq!((stored.seeders, stored.leechers), (12, 3));
    }

    #[tokio::test]
    async fn test_lower_reading_does_not_write() {
        let scraper = MockScraper::new().with_counts("udp://one:1", 4, 1);
        let store = Arc::new(FlakyRecordStore::new());
        store.insert(
            create_test_info_hash(),
            SwarmHealthRecord {
                seeders: 10,
                leechers: 3,
                fetched_at: Utc::now(),
            },
        );

        let reconciler =
            SwarmHealthReconciler::new(Arc::new(scraper), store.clone(), test_config());
        let stats = reconciler.refresh(&target(&["udp://one:1"])).await;

        assert_eq!((stats.seeders, stats.leechers), (Some(10), Some(3)));
        assert_eq!(stats.persistence, PersistenceOutcome::Unchanged);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_no_responders_and_no_record_is_unknown() {
        let reconciler = SwarmHealthReconciler::new(
            Arc::new(MockScraper::new()),
            Arc::new(InMemorySwarmRecordStore::new()),
            test_config(),
        );

        let stats = reconciler
            .refresh(&target(&["udp://dead:1", "http://gone/announce"]))
            .await;

        assert_eq!(stats.seeders, None);
        assert_eq!(stats.leechers, None);
        assert_eq!(stats.endpoints_queried, 2);
        assert_eq!(stats.endpoints_responded, 0);
        assert_eq!(stats.persistence, PersistenceOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_hanging_tracker_is_cut_off_by_timeout() {
        let scraper = MockScraper::new().with_counts("udp://fast:1", 5, 5);
        scraper.respond(
            "udp://hang:1",
            MockResponse::Slow {
                delay: Duration::from_secs(30),
                seeders: 1000,
                leechers: 1000,
            },
        );

        let reconciler = SwarmHealthReconciler::new(
            Arc::new(scraper),
            Arc::new(InMemorySwarmRecordStore::new()),
            test_config(),
        );

        let started = Instant::now();
        let stats = reconciler
            .refresh(&target(&["udp://hang:1", "udp://fast:1"]))
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(stats.endpoints_responded, 1);
        assert_eq!(stats.seeders, Some(5));
    }

    #[tokio::test]
    async fn test_store_failures_do_not_fail_refresh() {
        let scraper = MockScraper::new().with_counts("udp://one:1", 7, 2);
        let store = Arc::new(FlakyRecordStore::new());
        store.set_load_failure(true);
        store.set_save_failure(true);

        let reconciler =
            SwarmHealthReconciler::new(Arc::new(scraper), store.clone(), test_config());
        let stats = reconciler.refresh(&target(&["udp://one:1"])).await;

        assert_eq!((stats.seeders, stats.leechers), (Some(7), Some(2)));
        assert!(stats.load_error.is_some());
        assert_eq!(stats.persistence, PersistenceOutcome::SkippedUnreadable);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_save_failure_is_reported() {
        let scraper = MockScraper::new().with_counts("udp://one:1", 7, 2);
        let store = Arc::new(FlakyRecordStore::new());
        store.set_save_failure(true);

        let reconciler =
            SwarmHealthReconciler::new(Arc::new(scraper), store.clone(), test_config());
        let stats = reconciler.refresh(&target(&["udp://one:1"])).await;

        assert_eq!((stats.seeders, stats.leechers), (Some(7), Some(2)));
        assert!(stats.load_error.is_none());
        assert!(matches!(
            stats.persistence,
            PersistenceOutcome::WriteFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreadable_record_is_not_overwritten() {
        let scraper = MockScraper::new().with_counts("udp://one:1", 2, 1);
        let store = Arc::new(FlakyRecordStore::new());
        store.insert(
            create_test_info_hash(),
            SwarmHealthRecord {
                seeders: 10,
                leechers: 3,
                fetched_at: Utc::now(),
            },
        );
        store.set_load_failure(true);

        let reconciler =
            SwarmHealthReconciler::new(Arc::new(scraper), store.clone(), test_config());
        let stats = reconciler.refresh(&target(&["udp://one:1"])).await;

        assert_eq!((stats.seeders, stats.leechers), (Some(2), Some(1)));
        assert_eq!(stats.persistence, PersistenceOutcome::SkippedUnreadable);

        let kept = store.get(&create_test_info_hash()).unwrap();
        assert_eq!((kept.seeders, kept.leechers), (10, 3));
        assert_eq!(store.save_count(), 0);

        // Once the store is readable again the higher counts win
        store.set_load_failure(false);
        let stats = reconciler.refresh(&target(&["udp://one:1"])).await;
        assert_eq!((stats.seeders, stats.leechers), (Some(10), Some(3)));
        assert_eq!(stats.persistence, PersistenceOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_fallback_trackers_are_queried() {
        let scraper = MockScraper::new().with_counts("udp://fallback:1", 3, 3);
        let calls = scraper.clone();
        let config = SwarmConfig {
            fallback_trackers: vec!["udp://fallback:1".to_string()],
            ..test_config()
        };

        let reconciler = SwarmHealthReconciler::new(
            Arc::new(scraper),
            Arc::new(InMemorySwarmRecordStore::new()),
            config,
        );
        let stats = reconciler.refresh(&target(&["udp://fallback:1"])).await;

        assert_eq!(stats.endpoints_queried, 1);
        assert_eq!(calls.calls(), vec!["udp://fallback:1".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_stored_counts_never_decrease(
            passes in proptest::collection::vec(
                proptest::collection::vec((0u32..1000, 0u32..1000), 0..4),
                1..8,
            )
        ) {
            let now = Utc::now();
            let mut stored: Option<SwarmHealthRecord> = None;

            for pass in passes {
                let outcomes: Vec<_> = pass.iter().map(|&(s, l)| sample(s, l)).collect();
                let (merged, improved) =
                    SwarmHealthRecord::merge(stored.as_ref(), fresh_reading(&outcomes), now);

                if let (Some(before), Some(after)) = (stored, merged) {
                    prop_assert!(after.seeders >= before.seeders);
                    prop_assert!(after.leechers >= before.leechers);
                }
                if improved {
                    stored = merged;
                }
            }
        }
    }
}
