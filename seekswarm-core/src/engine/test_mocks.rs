//! Mock engine for exercising the streaming layer without a swarm.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::{EngineError, PriorityRequest, StreamingEngine};
use crate::streaming::SessionId;
use crate::torrent::{InfoHash, TorrentDescriptor};

/// In-memory engine that records every instruction it receives.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the session store owns another.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    descriptors: Arc<RwLock<HashMap<InfoHash, TorrentDescriptor>>>,
    priority_requests: Arc<Mutex<Vec<PriorityRequest>>>,
    released_sessions: Arc<Mutex<Vec<SessionId>>>,
    fail_prioritization: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    fail_release: Arc<AtomicBool>,
}

impl MockEngine {
    /// Creates an engine with no known torrents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine that already knows `descriptor`.
    pub fn with_descriptor(descriptor: TorrentDescriptor) -> Self {
        let engine = Self::new();
        engine.add_descriptor(descriptor);
        engine
    }

    /// Registers torrent metadata.
    pub fn add_descriptor(&self, descriptor: TorrentDescriptor) {
        self.descriptors
            .write()
            .insert(descriptor.info_hash, descriptor);
    }

    /// Makes subsequent prioritization calls fail.
    pub fn set_prioritization_failure(&self, fail: bool) {
        self.fail_prioritization.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent reads fail.
    pub fn set_read_failure(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent releases fail.
    pub fn set_release_failure(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    /// Priority instructions received so far, in arrival order.
    pub fn priority_requests(&self) -> Vec<PriorityRequest> {
        self.priority_requests.lock().clone()
    }

    /// Sessions whose resources were released, in arrival order.
    pub fn released_sessions(&self) -> Vec<SessionId> {
        self.released_sessions.lock().clone()
    }
}

#[async_trait]
impl StreamingEngine for MockEngine {
    async fn torrent_descriptor(
        &self,
        info_hash: InfoHash,
    ) -> Result<TorrentDescriptor, EngineError> {
        self.descriptors
            .read()
            .get(&info_hash)
            .cloned()
            .ok_or(EngineError::TorrentNotFound { info_hash })
    }

    async fn prioritize_pieces(&self, request: PriorityRequest) -> Result<(), EngineError> {
        if self.fail_prioritization.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable {
                reason: "mock prioritization failure".to_string(),
            });
        }
        self.priority_requests.lock().push(request);
        Ok(())
    }

    async fn release_session(
        &self,
        session_id: SessionId,
        _info_hash: InfoHash,
    ) -> Result<(), EngineError> {
        // Recorded even when failing so tests can see the attempt
        self.released_sessions.lock().push(session_id);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable {
                reason: "mock release failure".to_string(),
            });
        }
        Ok(())
    }

    async fn read_file_range(
        &self,
        _info_hash: InfoHash,
        file_path: &str,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, EngineError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(EngineError::ReadFailed {
                path: file_path.to_string(),
                reason: "mock read failure".to_string(),
            });
        }
        let data: Vec<u8> = (offset..offset + length).map(|i| (i % 256) as u8).collect();
        Ok(Bytes::from(data))
    }
}
