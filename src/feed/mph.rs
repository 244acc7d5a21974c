//! MiningPoolHub 收益统计客户端

use crate::error::FeedError;
use crate::feed::{StatCoin, StatsSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const MPH_STATS_URL: &str =
    "https://miningpoolhub.com/index.php?page=api&action=getminingandprofitsstatistics";

/// API 响应外壳
#[derive(Debug, Deserialize)]
struct MphResponse {
    success: bool,
    #[serde(rename = "return", default)]
    payload: serde_json::Value,
}

pub struct MphClient {
    client: reqwest::Client,
    url: String,
}

impl MphClient {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.unwrap_or_else(|| MPH_STATS_URL.to_string()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// 解析响应正文
pub fn parse_response(body: &str) -> Result<Vec<StatCoin>, FeedError> {
    let response: MphResponse = serde_json::from_str(body)
        .map_err(|e| FeedError::InvalidResponse { reason: e.to_string() })?;

    if !response.success {
        return Err(FeedError::Server { message: response.payload.to_string() });
    }

    serde_json::from_value(response.payload)
        .map_err(|e| FeedError::InvalidResponse { reason: e.to_string() })
}

#[async_trait]
impl StatsSource for MphClient {
    async fn fetch(&self) -> Result<Vec<StatCoin>, FeedError> {
        debug!("Fetching profit statistics from {}", self.url);

        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let stats = parse_response(&body);
        if let Err(e) = &stats {
            warn!("Unusable profit statistics: {}", e);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let body = r#"{"success": true, "return": [
            {"coin_name": "ethereum", "algo": "Ethash", "profit": 0.5, "pool_hash": "1G",
             "direct_mining_host": "eth.hub", "port": 20535},
            {"coin_name": "monero", "algo": "Cryptonight", "profit": 0.2, "pool_hash": "3M",
             "direct_mining_host": "xmr.hub", "port": 20580}
        ]}"#;
        let stats = parse_response(body).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[1].coin_name, "monero");
        assert_eq!(stats[1].port, 20580);
    }

    #[test]
    fn test_parse_server_error() {
        let body = r#"{"success": false, "return": "rate limited"}"#;
        match parse_response(body) {
            Err(FeedError::Server { message }) => assert!(message.contains("rate limited")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_response("<html>"),
            Err(FeedError::InvalidResponse { .. })
        ));
        assert!(matches!(
            parse_response(r#"{"success": true, "return": 5}"#),
            Err(FeedError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_default_url() {
        let client = MphClient::new(None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.url(), MPH_STATS_URL);
    }
}
