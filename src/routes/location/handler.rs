use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::AppState;
use crate::error::ProxyError;
use crate::quota::mask_key;
use crate::utils::{ClientIp, substitute_loopback};

use super::model::{GeoFeature, QuotaExhaustedResponse};

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub ip: Option<String>,
}

#[axum::debug_handler]
pub async fn locate(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    Query(query): Query<LocationQuery>,
) -> Response {
    let ip = query
        .ip
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or(client_ip);
    let ip = substitute_loopback(&ip, &state.config.ipgeo_loopback_ip);

    let Some(api_key) = state.rotator.pick_available_key().await else {
        tracing::warn!("Daily quota exhausted for all API keys, answering {} offline", ip);
        let fallback = offline_feature(&state, &ip);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(QuotaExhaustedResponse {
                error: "Daily quota exhausted for all API keys".into(),
                fallback,
            }),
        )
            .into_response();
    };

    match lookup_live(&state, ip.clone(), api_key.clone()).await {
        Ok(feature) => Json(feature).into_response(),
        Err(e) => {
            tracing::warn!(
                "Live geolocation with {} failed, answering {} offline: {}",
                mask_key(&api_key),
                ip,
                e
            );
            let mut feature = offline_feature(&state, &ip);
            feature.properties.meta.api_key_used = Some(api_key);
            Json(feature).into_response()
        }
    }
}

fn offline_feature(state: &AppState, ip: &str) -> GeoFeature {
    GeoFeature::offline(
        ip,
        state.geo_db.lookup_str(ip),
        &state.config.geoip_default_timezone,
    )
}

/// Calls ipgeolocation.io with `api_key` and counts the call against the
/// key once the upstream has answered successfully.
///
/// Runs on its own task so the usage counter is updated even if the
/// caller disconnects.
async fn lookup_live(
    state: &AppState,
    ip: String,
    api_key: String,
) -> Result<GeoFeature, ProxyError> {
    let client = state.upstreams.ipgeo.clone();
    let rotator = state.rotator.clone();

    let task = tokio::spawn(async move {
        let payload = client
            .get_json("ipgeo", &[("apiKey", api_key.as_str()), ("ip", ip.as_str())])
            .await?;
        rotator.record_usage(&api_key).await;
        GeoFeature::from_ipgeo(payload, &ip, &api_key)
    });

    task.await
        .map_err(|e| ProxyError::Internal(format!("geolocation task failed: {}", e)))?
}
