use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct KakaoConfig {
    /// The REST API key, sent as `Authorization: KakaoAK <key>`.
    pub api_key: String,

    /// Scheme and host of the API, the search path is appended to it.
    #[serde(default = "default_kakao_url")]
    pub base_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Either `accuracy` or `latest`.
    #[serde(default = "default_sort")]
    pub sort: String,

    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for the whole request, including reading the body.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

// Keeps the API key out of logs.
impl fmt::Debug for KakaoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KakaoConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("sort", &self.sort)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn default_kakao_url() -> String {
    "https://dapi.kakao.com/".into()
}

fn default_page_size() -> u32 {
    10
}

fn default_sort() -> String {
    "accuracy".into()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Synthetic search results with artificial latency, for load tests and local development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedConfig {
    #[serde(with = "humantime_serde")]
    pub min_latency: Duration,
    #[serde(with = "humantime_serde")]
    pub max_latency: Duration,
}

impl Default for GeneratedConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(200),
            max_latency: Duration::from_millis(500),
        }
    }
}

/// The origin that answers search requests on a cache miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpstreamConfig {
    Kakao(KakaoConfig),
    Generated(GeneratedConfig),
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self::Generated(GeneratedConfig::default())
    }
}
