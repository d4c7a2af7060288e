use std::ops::Range;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use rand::Rng;

use super::{Book, GeneratedConfig, PageInfo, SearchAdapter, SearchBookResponse};

const PAGE_SIZE: u32 = 10;
/// Like the real API, never page deeper than this many results.
const MAX_PAGEABLE: u32 = 1000;

const TITLES: &[&str] = &[
    "Getting Started",
    "in Action",
    "Cookbook",
    "The Definitive Guide",
    "Design Patterns",
    "Deep Dive",
    "for Professionals",
    "Internals",
];

const UNRELATED_TITLES: &[&str] = &[
    "Clean Code",
    "Refactoring",
    "The Pragmatic Programmer",
    "Domain-Driven Design",
    "Release It!",
    "Designing Data-Intensive Applications",
];

const AUTHORS: &[&str] = &[
    "Kim Minsu",
    "Lee Jiwon",
    "Park Seoyeon",
    "Choi Hyunwoo",
    "Jung Yuna",
    "Martin Kleppmann",
    "Kent Beck",
];

/// Produces plausible search results without any network access.
///
/// Every call sleeps for a random latency in the configured range, then makes up a page of
/// results. The number of results depends on how popular the query looks.
#[derive(Debug)]
pub struct GeneratedSearchAdapter {
    config: GeneratedConfig,
}

impl GeneratedSearchAdapter {
    pub fn new(config: GeneratedConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SearchAdapter for GeneratedSearchAdapter {
    async fn search(&self, query: &str, page: u32) -> Result<SearchBookResponse> {
        let GeneratedConfig {
            min_latency,
            max_latency,
        } = self.config;
        let latency = if max_latency > min_latency {
            rand::rng().random_range(min_latency..=max_latency)
        } else {
            min_latency
        };

        let start = Instant::now();
        tokio::time::sleep(latency).await;
        let response = generate(&mut rand::rng(), query, page, Utc::now().date_naive());
        metric!(timer("upstream.duration") = start.elapsed(), "upstream" => "generated");

        Ok(response)
    }

    fn name(&self) -> &'static str {
        "generated"
    }
}

fn total_range(query: &str) -> Range<u32> {
    if query.contains("spring") {
        150..200
    } else if query.contains("java") {
        200..300
    } else if query.contains("python") {
        80..120
    } else if query.contains("redis") {
        50..80
    } else if query.contains("mysql") {
        60..85
    } else {
        20..50
    }
}

fn pick<'a, R: Rng>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items[rng.random_range(0..items.len())]
}

fn generate<R: Rng>(rng: &mut R, query: &str, page: u32, today: NaiveDate) -> SearchBookResponse {
    let total_count = rng.random_range(total_range(query));
    let pageable_count = total_count.min(MAX_PAGEABLE);

    let start = page.saturating_sub(1).saturating_mul(PAGE_SIZE);
    let count = pageable_count.saturating_sub(start).min(PAGE_SIZE);

    let books = (0..count)
        .map(|index| {
            let title = if rng.random_bool(0.7) {
                format!("{query} {}", pick(rng, TITLES))
            } else {
                pick(rng, UNRELATED_TITLES).to_owned()
            };
            let published_at = today
                .checked_sub_days(Days::new(rng.random_range(0..3650)))
                .unwrap_or(today);
            Book {
                title,
                author: pick(rng, AUTHORS).to_owned(),
                published_at,
                thumbnail: format!(
                    "https://picsum.photos/seed/{query}-{}/120/174",
                    start + index
                ),
            }
        })
        .collect();

    SearchBookResponse {
        books,
        page_info: PageInfo {
            is_end: start + count >= pageable_count,
            pageable_count,
            total_count,
            page,
        },
    }
}
