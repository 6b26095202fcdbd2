//! UDP scrape client (BEP 15)

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng as _;
use tokio::net::UdpSocket;
use tracing::debug;

use super::{ScrapeCounts, TrackerError, TrackerScraper};
use crate::torrent::InfoHash;

const PROTOCOL_ID: u64 = 0x41727101980;
const ACTION_CONNECT: u32 = 0;
const ACTION_SCRAPE: u32 = 2;
const ACTION_ERROR: u32 = 3;
const CONNECT_RESPONSE_LEN: usize = 16;
const SCRAPE_RESPONSE_LEN: usize = 20;

/// Scrapes UDP trackers with a fresh socket per request.
#[derive(Debug, Default)]
pub struct UdpScraper;

impl UdpScraper {
    pub fn new() -> Self {
        Self
    }

    async fn scrape_inner(
        endpoint: &str,
        info_hash: &InfoHash,
    ) -> Result<ScrapeCounts, TrackerError> {
        let addr = resolve_endpoint(endpoint).await?;
        let io_error = |e: std::io::Error| TrackerError::Io {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        };

        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await.map_err(io_error)?;
        socket.connect(addr).await.map_err(io_error)?;

        let transaction_id: u32 = rand::rng().random();
        socket
            .send(&connect_request(transaction_id))
            .await
            .map_err(io_error)?;
        let response = receive(&socket, endpoint).await?;
        let connection_id = parse_connect_response(endpoint, &response, transaction_id)?;

        let transaction_id: u32 = rand::rng().random();
        socket
            .send(&scrape_request(connection_id, transaction_id, info_hash))
            .await
            .map_err(io_error)?;
        let response = receive(&socket, endpoint).await?;
        parse_scrape_response(endpoint, &response, transaction_id)
    }
}

#[async_trait]
impl TrackerScraper for UdpScraper {
    async fn scrape(
        &self,
        endpoint: &str,
        info_hash: InfoHash,
        timeout: Duration,
    ) -> Result<ScrapeCounts, TrackerError> {
        debug!("Scraping UDP tracker: {}", endpoint);
        tokio::time::timeout(timeout, Self::scrape_inner(endpoint, &info_hash))
            .await
            .map_err(|_| TrackerError::Timeout {
                endpoint: endpoint.to_string(),
                timeout,
            })?
    }
}

async fn resolve_endpoint(endpoint: &str) -> Result<SocketAddr, TrackerError> {
    let invalid = |reason: &str| TrackerError::InvalidUrl {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let url = url::Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let port = url.port().ok_or_else(|| invalid("missing port"))?;
    // IPv6 literals come back bracketed from host_str
    let host = host.trim_start_matches('[').trim_end_matches(']');

    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TrackerError::Connection {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| TrackerError::Connection {
            endpoint: endpoint.to_string(),
            reason: "host resolved to no addresses".to_string(),
        })
}

async fn receive(socket: &UdpSocket, endpoint: &str) -> Result<Vec<u8>, TrackerError> {
    let mut buf = vec![0u8; 2048];
    let n = socket.recv(&mut buf).await.map_err(|e| TrackerError::Io {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    buf.truncate(n);
    Ok(buf)
}

fn connect_request(transaction_id: u32) -> Vec<u8> {
    let mut request = Vec::with_capacity(16);
    request.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
    request.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request
}

fn scrape_request(connection_id: u64, transaction_id: u32, info_hash: &InfoHash) -> Vec<u8> {
    let mut request = Vec::with_capacity(36);
    request.extend_from_slice(&connection_id.to_be_bytes());
    request.extend_from_slice(&ACTION_SCRAPE.to_be_bytes());
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request.extend_from_slice(info_hash.as_bytes());
    request
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Validates the action/transaction header shared by every response.
fn check_header(
    endpoint: &str,
    response: &[u8],
    expected_action: u32,
    transaction_id: u32,
    min_len: usize,
) -> Result<(), TrackerError> {
    let malformed = |reason: String| TrackerError::Malformed {
        endpoint: endpoint.to_string(),
        reason,
    };

    if response.len() < 8 {
        return Err(malformed(format!("{}-byte response", response.len())));
    }
    let action = read_u32(response, 0);
    if read_u32(response, 4) != transaction_id {
        return Err(malformed("transaction id mismatch".to_string()));
    }
    if action == ACTION_ERROR {
        return Err(TrackerError::TrackerFailure {
            endpoint: endpoint.to_string(),
            reason: String::from_utf8_lossy(&response[8..]).to_string(),
        });
    }
    if action != expected_action {
        return Err(malformed(format!(
            "expected action {expected_action}, got {action}"
        )));
    }
    if response.len() < min_len {
        return Err(malformed(format!(
            "{}-byte response, expected at least {min_len}",
            response.len()
        )));
    }
    Ok(())
}

fn parse_connect_response(
    endpoint: &str,
    response: &[u8],
    transaction_id: u32,
) -> Result<u64, TrackerError> {
    check_header(
        endpoint,
        response,
        ACTION_CONNECT,
        transaction_id,
        CONNECT_RESPONSE_LEN,
    )?;
    let mut id = [0u8; 8];
    id.copy_from_slice(&response[8..16]);
    Ok(u64::from_be_bytes(id))
}

fn parse_scrape_response(
    endpoint: &str,
    response: &[u8],
    transaction_id: u32,
) -> Result<ScrapeCounts, TrackerError> {
    check_header(
        endpoint,
        response,
        ACTION_SCRAPE,
        transaction_id,
        SCRAPE_RESPONSE_LEN,
    )?;
    // seeders, completed, leechers
    Ok(ScrapeCounts {
        seeders: read_u32(response, 8),
        completed: Some(read_u32(response, 12)),
        leechers: read_u32(response, 16),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::test_data::create_test_info_hash;

    /// Answers one connect and one scrape the way a BEP 15 tracker would.
    async fn spawn_fake_tracker(
        seeders: u32,
        leechers: u32,
        fail_scrape: bool,
    ) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("udp://{}/announce", socket.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 2048];

            let (n, peer) = socket.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, 16);
            assert_eq!(&buf[0..8], &PROTOCOL_ID.to_be_bytes());
            let mut reply = Vec::new();
            reply.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
            reply.extend_from_slice(&buf[12..16]);
            reply.extend_from_slice(&0xDEAD_BEEF_u64.to_be_bytes());
            socket.send_to(&reply, peer).await.unwrap();

            let (n, peer) = socket.recv_from(&mut buf).await.unwrap();
            let request = buf[..n].to_vec();
            let mut reply = Vec::new();
            if fail_scrape {
                reply.extend_from_slice(&ACTION_ERROR.to_be_bytes());
                reply.extend_from_slice(&request[12..16]);
                reply.extend_from_slice(b"torrent not registered");
            } else {
                reply.extend_from_slice(&ACTION_SCRAPE.to_be_bytes());
                reply.extend_from_slice(&request[12..16]);
                reply.extend_from_slice(&seeders.to_be_bytes());
                reply.extend_from_slice(&99u32.to_be_bytes());
                reply.extend_from_slice(&leechers.to_be_bytes());
            }
            socket.send_to(&reply, peer).await.unwrap();
            request
        });

        (endpoint, handle)
    }

    #[tokio::test]
    async fn test_scrape_against_fake_tracker() {
        let (endpoint, tracker) = spawn_fake_tracker(12, 4, false).await;
        let info_hash = create_test_info_hash();

        let counts = UdpScraper::new()
            .scrape(&endpoint, info_hash, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            counts,
            ScrapeCounts {
                seeders: 12,
                leechers: 4,
                completed: Some(99)
            }
        );

        let request = tracker.await.unwrap();
        assert_eq!(&request[0..8], &0xDEAD_BEEF_u64.to_be_bytes());
        assert_eq!(read_u32(&request, 8), ACTION_SCRAPE);
        assert_eq!(&request[16..36], info_hash.as_bytes());
    }

    #[tokio::test]
    async fn test_error_action_maps_to_tracker_failure() {
        let (endpoint, _tracker) = spawn_fake_tracker(0, 0, true).await;

        let result = UdpScraper::new()
            .scrape(&endpoint, create_test_info_hash(), Duration::from_secs(2))
            .await;
        assert!(matches!(
            result,
            Err(TrackerError::TrackerFailure { reason, .. }) if reason == "torrent not registered"
        ));
    }

    #[tokio::test]
    async fn test_silent_tracker_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("udp://{}/announce", silent.local_addr().unwrap());

        let result = UdpScraper::new()
            .scrape(&endpoint, create_test_info_hash(), Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(TrackerError::Timeout { .. })));
    }

    #[test]
    fn test_response_validation() {
        let mut response = Vec::new();
        response.extend_from_slice(&ACTION_SCRAPE.to_be_bytes());
        response.extend_from_slice(&7u32.to_be_bytes());
        response.extend_from_slice(&[0u8; 12]);

        assert!(parse_scrape_response("udp://t:1", &response, 7).is_ok());
        assert!(matches!(
            parse_scrape_response("udp://t:1", &response, 8),
            Err(TrackerError::Malformed { .. })
        ));
        assert!(matches!(
            parse_scrape_response("udp://t:1", &response[..12], 7),
            Err(TrackerError::Malformed { .. })
        ));
        assert!(matches!(
            parse_connect_response("udp://t:1", &response, 7),
            Err(TrackerError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_endpoint_requires_port() {
        let result = resolve_endpoint("udp://tracker.example.com/announce").await;
        assert!(matches!(result, Err(TrackerError::InvalidUrl { .. })));
    }
}
