//! Upstream book search.
//!
//! A [`SearchAdapter`] answers a search for one page of results. The cache sits in front of it
//! and only calls it on misses and refreshes.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

mod config;
mod generated;
mod kakao;
mod normalize;
mod types;

pub use config::{GeneratedConfig, KakaoConfig, UpstreamConfig};
pub use generated::GeneratedSearchAdapter;
pub use kakao::KakaoSearchAdapter;
pub use normalize::normalize_query;
pub use types::{Book, PageInfo, SearchBookResponse};

/// The slow origin behind the cache.
#[async_trait]
pub trait SearchAdapter: fmt::Debug + Send + Sync {
    /// Fetches the 1-based `page` of results for an already normalized `query`.
    async fn search(&self, query: &str, page: u32) -> Result<SearchBookResponse>;

    /// A short name for logs and metric tags.
    fn name(&self) -> &'static str;
}

/// Creates the adapter selected in the configuration.
pub fn create_adapter(config: &UpstreamConfig) -> Result<Arc<dyn SearchAdapter>> {
    Ok(match config {
        UpstreamConfig::Kakao(config) => Arc::new(KakaoSearchAdapter::new(config)?),
        UpstreamConfig::Generated(config) => Arc::new(GeneratedSearchAdapter::new(*config)),
    })
}
