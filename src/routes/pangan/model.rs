use std::collections::BTreeMap;

use serde_json::Value;

use crate::AppState;
use crate::cache::CacheKey;
use crate::error::ProxyError;

const PROVINCES_PATH: &str = "provinces";
const CITIES_PATH: &str = "cities";
const PRICES_PATH: &str = "front/harga-pangan-informasi";

/// Pulls the list at `pointer` out of the upstream envelope; a missing or
/// null list becomes `[]`.
pub fn extract_list(payload: &Value, pointer: &str) -> Value {
    match payload.pointer(pointer) {
        Some(Value::Null) | None => Value::Array(Vec::new()),
        Some(list) => list.clone(),
    }
}

pub async fn fetch_provinces(state: &AppState, search: String) -> Result<Value, ProxyError> {
    let key = CacheKey::from_params([("search", Some(search.clone()))]);
    let client = state.upstreams.pangan.clone();

    state
        .caches
        .provinces
        .get_or_fetch(key, state.config.pangan_cache_ttl(), move || async move {
            let payload = client
                .get_json(PROVINCES_PATH, &[("search", search.as_str())])
                .await?;
            Ok(extract_list(&payload, "/data"))
        })
        .await
}

pub async fn fetch_cities(state: &AppState, province_id: String) -> Result<Value, ProxyError> {
    let key = CacheKey::from_params([("province_id", Some(province_id.clone()))]);
    let client = state.upstreams.pangan.clone();

    state
        .caches
        .cities
        .get_or_fetch(key, state.config.pangan_cache_ttl(), move || async move {
            let payload = client
                .get_json(CITIES_PATH, &[("province_id", province_id.as_str())])
                .await?;
            Ok(extract_list(&payload, "/data/data"))
        })
        .await
}

/// `params` must already be stripped of empty values.
pub async fn fetch_prices(
    state: &AppState,
    params: BTreeMap<String, String>,
) -> Result<Value, ProxyError> {
    let key = CacheKey::from_map(&params);
    let client = state.upstreams.pangan.clone();

    state
        .caches
        .prices
        .get_or_fetch(key, state.config.pangan_price_cache_ttl(), move || async move {
            let payload = client.get_json(PRICES_PATH, &params).await?;
            Ok(extract_list(&payload, "/data"))
        })
        .await
}
