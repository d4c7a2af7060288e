use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use url::Url;

use super::{Book, KakaoConfig, PageInfo, SearchAdapter, SearchBookResponse};

/// Shown for books without any listed author.
const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct KakaoResponse {
    documents: Vec<KakaoDocument>,
    meta: KakaoMeta,
}

#[derive(Debug, Deserialize)]
struct KakaoDocument {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    thumbnail: String,
    /// RFC 3339, or empty when unknown.
    #[serde(default)]
    datetime: String,
}

#[derive(Debug, Deserialize)]
struct KakaoMeta {
    is_end: bool,
    pageable_count: u32,
    total_count: u32,
}

impl From<KakaoDocument> for Book {
    fn from(document: KakaoDocument) -> Self {
        let author = document
            .authors
            .into_iter()
            .next()
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_owned());
        Book {
            title: document.title,
            author,
            published_at: parse_date(&document.datetime),
            thumbnail: original_thumbnail(&document.thumbnail),
        }
    }
}

/// Reduces a timestamp to its date, falling back to the epoch.
fn parse_date(datetime: &str) -> NaiveDate {
    DateTime::parse_from_rfc3339(datetime)
        .map(|datetime| datetime.date_naive())
        .unwrap_or_default()
}

/// Kakao serves thumbnails through a resizing proxy which carries the original URL in `fname`.
fn original_thumbnail(thumbnail: &str) -> String {
    Url::parse(thumbnail)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(name, _)| name == "fname")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_else(|| thumbnail.to_owned())
}

/// Creates a [`reqwest::Client`] for calls to the search API.
fn create_client(connect_timeout: Duration, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .context("failed to create HTTP client")
}

/// Searches books through the Kakao Daum search API.
pub struct KakaoSearchAdapter {
    client: reqwest::Client,
    endpoint: Url,
    authorization: String,
    page_size: u32,
    sort: String,
}

impl fmt::Debug for KakaoSearchAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KakaoSearchAdapter")
            .field("endpoint", &self.endpoint.as_str())
            .field("page_size", &self.page_size)
            .field("sort", &self.sort)
            .finish()
    }
}

impl KakaoSearchAdapter {
    pub fn new(config: &KakaoConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.base_url)
            .and_then(|base| base.join("v3/search/book"))
            .context("invalid kakao base url")?;
        Ok(Self {
            client: create_client(config.connect_timeout, config.timeout)?,
            endpoint,
            authorization: format!("KakaoAK {}", config.api_key),
            page_size: config.page_size,
            sort: config.sort.clone(),
        })
    }
}

#[async_trait]
impl SearchAdapter for KakaoSearchAdapter {
    async fn search(&self, query: &str, page: u32) -> Result<SearchBookResponse> {
        let start = Instant::now();
        let response = self
            .client
            .get(self.endpoint.clone())
            .header(AUTHORIZATION, &self.authorization)
            .query(&[("query", query), ("sort", &self.sort)])
            .query(&[("page", page), ("size", self.page_size)])
            .send()
            .await
            .context("failed to reach kakao book search")?;

        let status = response.status();
        metric!(
            timer("upstream.duration") = start.elapsed(),
            "upstream" => "kakao",
            "status" => status.as_str(),
        );
        if !status.is_success() {
            anyhow::bail!("kakao book search responded with {status}");
        }

        let body: KakaoResponse = response
            .json()
            .await
            .context("failed to parse kakao book search response")?;

        Ok(SearchBookResponse {
            books: body.documents.into_iter().map(Book::from).collect(),
            page_info: PageInfo {
                is_end: body.meta.is_end,
                pageable_count: body.meta.pageable_count,
                total_count: body.meta.total_count,
                page,
            },
        })
    }

    fn name(&self) -> &'static str {
        "kakao"
    }
}
