//! Swarm health: seeder/leecher counts that survive unreliable trackers.
//!
//! Trackers routinely disagree, time out or lie low. The reconciler asks
//! all of them at once, keeps the highest answer per metric and never lets
//! a stored count go down because of a single low reading.

pub mod reconciler;
pub mod store;
pub mod test_mocks;
pub mod tracker;
pub mod types;

pub use reconciler::{SwarmHealthReconciler, candidate_endpoints, fresh_reading};
pub use store::{
    InMemorySwarmRecordStore, JsonFileSwarmRecordStore, StoreError, SwarmRecordStore,
};
pub use test_mocks::{FlakyRecordStore, MockResponse, MockScraper};
pub use tracker::{
    HttpScraper, SchemeScraper, ScrapeCounts, TrackerError, TrackerScraper, UdpScraper,
};
pub use types::{
    EndpointOutcome, FreshReading, PersistenceOutcome, SwarmHealthRecord, SwarmSample,
    SwarmStats, SwarmTarget,
};
