//! Scripted tracker and store doubles for exercising the reconciler

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::store::{StoreError, SwarmRecordStore};
use super::tracker::{ScrapeCounts, TrackerError, TrackerScraper};
use super::types::SwarmHealthRecord;
use crate::torrent::InfoHash;

/// How a scripted endpoint answers.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Counts { seeders: u32, leechers: u32 },
    Fail(TrackerError),
    /// Sleeps for the delay before answering with the counts
    Slow {
        delay: Duration,
        seeders: u32,
        leechers: u32,
    },
}

/// Tracker scraper answering from a script; unscripted endpoints fail.
#[derive(Debug, Clone, Default)]
pub struct MockScraper {
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(self, endpoint: &str, seeders: u32, leechers: u32) -> Self {
        self.respond(endpoint, MockResponse::Counts { seeders, leechers });
        self
    }

    pub fn respond(&self, endpoint: &str, response: MockResponse) {
        self.responses.lock().insert(endpoint.to_string(), response);
    }

    /// Endpoints queried so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TrackerScraper for MockScraper {
    async fn scrape(
        &self,
        endpoint: &str,
        _info_hash: InfoHash,
        _timeout: Duration,
    ) -> Result<ScrapeCounts, TrackerError> {
        self.calls.lock().push(endpoint.to_string());
        let response = self.responses.lock().get(endpoint).cloned();

        match response {
            Some(MockResponse::Counts { seeders, leechers }) => Ok(ScrapeCounts {
                seeders,
                leechers,
                completed: None,
            }),
            Some(MockResponse::Slow {
                delay,
                seeders,
                leechers,
            }) => {
                tokio::time::sleep(delay).await;
                Ok(ScrapeCounts {
                    seeders,
                    leechers,
                    completed: None,
                })
            }
            Some(MockResponse::Fail(error)) => Err(error),
            None => Err(TrackerError::Connection {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

/// Record store whose reads and writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyRecordStore {
    records: Mutex<HashMap<InfoHash, SwarmHealthRecord>>,
    fail_loads: Mutex<bool>,
    fail_saves: Mutex<bool>,
    saves: Mutex<usize>,
}

impl FlakyRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_load_failure(&self, fail: bool) {
        *self.fail_loads.lock() = fail;
    }

    pub fn set_save_failure(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn insert(&self, info_hash: InfoHash, record: SwarmHealthRecord) {
        self.records.lock().insert(info_hash, record);
    }

    pub fn get(&self, info_hash: &InfoHash) -> Option<SwarmHealthRecord> {
        self.records.lock().get(info_hash).copied()
    }

    fn simulated_error(operation: &str) -> StoreError {
        StoreError::Io {
            path: "mock-store".into(),
            source: std::io::Error::other(format!("simulated {operation} failure")),
        }
    }
}

#[async_trait]
impl SwarmRecordStore for FlakyRecordStore {
    async fn load(&self, info_hash: &InfoHash) -> Result<Option<SwarmHealthRecord>, StoreError> {
        if *self.fail_loads.lock() {
            return Err(Self::simulated_error("load"));
        }
        Ok(self.get(info_hash))
    }

    async fn save(
        &self,
        info_hash: &InfoHash,
        record: SwarmHealthRecord,
    ) -> Result<(), StoreError> {
        if *self.fail_saves.lock() {
            return Err(Self::simulated_error("save"));
        }
        self.insert(*info_hash, record);
        *self.saves.lock() += 1;
        Ok(())
    }
}
