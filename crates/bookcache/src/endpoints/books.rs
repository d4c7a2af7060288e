use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use bookcache_service::search::{SearchBookResponse, normalize_query};
use bookcache_service::services::SearchService;
use serde::Deserialize;

use crate::endpoints::ResponseError;

/// Deepest page that may be requested.
const MAX_PAGE: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct BookSearchParams {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

pub async fn search_books(
    State(service): State<SearchService>,
    params: Result<Query<BookSearchParams>, QueryRejection>,
) -> Result<Json<SearchBookResponse>, ResponseError> {
    let Query(params) = params?;

    if !(1..=MAX_PAGE).contains(&params.page) {
        return Err((StatusCode::BAD_REQUEST, "page must be between 1 and 50").into());
    }
    let query = normalize_query(&params.query);
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must contain letters or digits").into());
    }

    let response = service
        .search(&query, params.page)
        .await
        .map_err(|err| (StatusCode::BAD_GATEWAY, err))?;

    Ok(Json(response))
}
