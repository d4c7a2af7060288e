use axum::Json;
use axum::extract::State;
use bookcache_service::caching::CircuitState;
use bookcache_service::services::SearchService;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct UpstreamCount {
    pub requests: usize,
}

/// How often the upstream was called, including calls of the breaker fallback.
pub async fn upstream_count(State(service): State<SearchService>) -> Json<UpstreamCount> {
    Json(UpstreamCount {
        requests: service.upstream_requests(),
    })
}

#[derive(Debug, Serialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failures: u32,
}

pub async fn circuit_breaker(State(service): State<SearchService>) -> Json<BreakerStatus> {
    Json(BreakerStatus {
        state: service.breaker_state(),
        failures: service.breaker_failures(),
    })
}
