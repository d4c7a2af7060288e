use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub title: String,
    pub author: String,
    pub published_at: NaiveDate,
    pub thumbnail: String,
}

/// Paging information of one page of search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Whether this is the last page.
    pub is_end: bool,
    /// Number of results that can be paged through. The upstream caps this.
    pub pageable_count: u32,
    /// Number of matching documents.
    pub total_count: u32,
    /// The 1-based page number.
    pub page: u32,
}

/// One page of search results, as served to clients and stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBookResponse {
    pub books: Vec<Book>,
    pub page_info: PageInfo,
}
