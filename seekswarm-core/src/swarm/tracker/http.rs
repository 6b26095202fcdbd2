//! HTTP scrape client (BEP 48)

use std::time::Duration;

use async_trait::async_trait;
use bencode_rs::Value;
use tracing::debug;

use super::{ScrapeCounts, TrackerError, TrackerScraper};
use crate::config::SwarmConfig;
use crate::torrent::InfoHash;

/// Scrapes HTTP(S) trackers.
pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    /// Creates a scraper sharing one connection pool across endpoints.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Connection` - TLS backend or client setup failed
    pub fn new(config: &SwarmConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(config.tracker_timeout)
            .user_agent(config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| TrackerError::Connection {
                endpoint: "http client".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Derives the scrape URL from an announce URL.
    ///
    /// Per BEP 48 only URLs whose last path segment starts with `announce`
    /// support scrape; that segment is rewritten to `scrape`.
    ///
    /// # Errors
    ///
    /// - `TrackerError::InvalidUrl` - Endpoint has no `announce` segment
    pub(crate) fn scrape_url(endpoint: &str, info_hash: &InfoHash) -> Result<String, TrackerError> {
        let (base, query) = match endpoint.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (endpoint, None),
        };

        let slash = base.rfind('/').ok_or_else(|| TrackerError::InvalidUrl {
            endpoint: endpoint.to_string(),
            reason: "no path in announce URL".to_string(),
        })?;
        let (prefix, last_segment) = base.split_at(slash + 1);
        let rest = last_segment
            .strip_prefix("announce")
            .ok_or_else(|| TrackerError::InvalidUrl {
                endpoint: endpoint.to_string(),
                reason: "tracker does not support scrape".to_string(),
            })?;

        // Raw bytes are percent-encoded by hand; url encoders would treat them as UTF-8
        let encoded = url_encode_bytes(info_hash.as_bytes());
        let mut url = format!("{prefix}scrape{rest}?");
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push_str(query);
            url.push('&');
        }
        url.push_str("info_hash=");
        url.push_str(&encoded);
        Ok(url)
    }

    /// Extracts the counts for `info_hash` from a bencoded scrape body.
    ///
    /// # Errors
    ///
    /// - `TrackerError::TrackerFailure` - Body carries a `failure reason`
    /// - `TrackerError::Malformed` - Body is not a scrape dictionary or lacks the torrent
    pub(crate) fn parse_scrape_response(
        endpoint: &str,
        info_hash: &InfoHash,
        body: &[u8],
    ) -> Result<ScrapeCounts, TrackerError> {
        let malformed = |reason: &str| TrackerError::Malformed {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Value::parse(body)
            .map_err(|e| malformed(&format!("failed to decode bencode: {e:?}")))?;
        let Some(Value::Dictionary(dict)) = parsed.first() else {
            return Err(malformed("scrape response is not a dictionary"));
        };

        if let Some(Value::Bytes(reason)) = dict.get(b"failure reason".as_slice()) {
            return Err(TrackerError::TrackerFailure {
                endpoint: endpoint.to_string(),
                reason: String::from_utf8_lossy(reason).to_string(),
            });
        }

        let Some(Value::Dictionary(files)) = dict.get(b"files".as_slice()) else {
            return Err(malformed("missing files dictionary"));
        };
        let Some(Value::Dictionary(stats)) = files.get(info_hash.as_bytes().as_slice()) else {
            return Err(malformed("torrent not present in scrape response"));
        };

        let count = |key: &[u8]| match stats.get(key) {
            Some(Value::Integer(value)) => u32::try_from(*value).ok(),
            _ => None,
        };

        Ok(ScrapeCounts {
            seeders: count(b"complete").ok_or_else(|| malformed("missing complete count"))?,
            leechers: count(b"incomplete").ok_or_else(|| malformed("missing incomplete count"))?,
            completed: count(b"downloaded"),
        })
    }
}

/// URL encode bytes for tracker communication per RFC 3986.
fn url_encode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| format!("%{b:02X}")).collect()
}

#[async_trait]
impl TrackerScraper for HttpScraper {
    async fn scrape(
        &self,
        endpoint: &str,
        info_hash: InfoHash,
        timeout: Duration,
    ) -> Result<ScrapeCounts, TrackerError> {
        let url = Self::scrape_url(endpoint, &info_hash)?;
        debug!("Scraping HTTP tracker: {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TrackerError::Timeout {
                        endpoint: endpoint.to_string(),
                        timeout,
                    }
                } else {
                    TrackerError::Connection {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| TrackerError::Connection {
            endpoint: endpoint.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;

        Self::parse_scrape_response(endpoint, &info_hash, &body)
    }
}
