use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CacheEntries {
    pub weather: usize,
    pub provinces: usize,
    pub cities: usize,
    pub prices: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub timestamp: i64,
    pub usage_store: &'static str,
    pub cache_entries: CacheEntries,
}

#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let caches = &state.caches;
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now().timestamp_millis(),
        usage_store: state.rotator.store().backend(),
        cache_entries: CacheEntries {
            weather: caches.weather.len(),
            provinces: caches.provinces.len(),
            cities: caches.cities.len(),
            prices: caches.prices.len(),
        },
    })
}
